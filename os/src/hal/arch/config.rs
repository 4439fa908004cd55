#![allow(unused)]

//! ARMv7-M 体系结构常量，硬件后端与主机模型共用

/// 异常入口要求栈指针 8 字节对齐
pub const STACK_ALIGN: u32 = 8;
/// 寄存器字长（字节）
pub const WORD_SIZE: u32 = 4;

/// 新栈帧的填充值，未初始化寄存器在内存转储里一眼可见
pub const STACK_POISON: u32 = 0xDEAD_BEEF;

/// 初始 xPSR：只置 Thumb 位
pub const INITIAL_XPSR: u32 = 1 << 24;
/// xPSR 第 9 位：异常入口时硬件为对齐插入了一个填充字
pub const XPSR_STACK_ALIGNED: usize = 9;

/// 返回 Handler 模式，使用 MSP
pub const EXC_RETURN_HANDLER: u32 = 0xFFFF_FFF1;
/// 返回 Thread 模式，使用 MSP
pub const EXC_RETURN_THREAD_MSP: u32 = 0xFFFF_FFF9;
/// 返回 Thread 模式，使用 PSP，基本异常帧
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;
/// 返回 Thread 模式，使用 PSP，扩展（浮点）异常帧
pub const EXC_RETURN_THREAD_PSP_FP: u32 = 0xFFFF_FFED;

/// EXC_RETURN 位：1 表示返回后使用 PSP
pub const EXC_RETURN_SPSEL: usize = 2;
/// EXC_RETURN 位：1 表示返回 Thread 模式
pub const EXC_RETURN_MODE: usize = 3;
/// EXC_RETURN 位：0 表示异常帧带浮点扩展
pub const EXC_RETURN_FTYPE: usize = 4;

/// 保存上下文中的浮点标记
pub const CONTEXT_FLAG_PLAIN: u32 = 0;
pub const CONTEXT_FLAG_FP: u32 = 1;

// System Control Block
pub const SCB_ICSR: u32 = 0xE000_ED04;
pub const SCB_VTOR: u32 = 0xE000_ED08;
pub const SCB_SHPR3: u32 = 0xE000_ED20;

/// ICSR.PENDSVSET
pub const ICSR_PENDSVSET: u32 = 1 << 28;
/// SHPR3 中 PendSV 与 SysTick 的优先级字段全部置为最低
pub const SHPR3_LOWEST: u32 = 0xFFFF_0000;

/// CONTROL.FPCA
pub const CONTROL_FPCA: u32 = 1 << 2;
