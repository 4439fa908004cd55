//! PendSV 跳板
//!
//! 保存顺序（向低地址压栈）：`[s16-s31]`、`r4-r11`、`flag, reserved`，
//! 恢复顺序相反。被换出线程的 sp 写回 `*from` 之后才清除 `pending`、载入 `*to`。

use crate::context::switch::{PORT_FROM, PORT_PENDING, PORT_STATE, PORT_TO};
use crate::hal::{CONTROL_FPCA, ICSR_PENDSVSET, SCB_ICSR, SCB_SHPR3, SCB_VTOR, SHPR3_LOWEST};
use core::arch::global_asm;

#[cfg(not(feature = "fpu"))]
global_asm!(
    "
    .syntax unified
    .section .text.PendSV,\"ax\",%progbits
    .global PendSV
    .type PendSV,%function
    .thumb_func
PendSV:
    mrs     r2, PRIMASK
    cpsid   i

    movw    r0, #:lower16:PORT
    movt    r0, #:upper16:PORT
    ldrb    r1, [r0, #{state}]      @ 已停机
    cmp     r1, #0
    bne     2f
    ldr     r1, [r0, #{pending}]
    cmp     r1, #0
    beq     2f

    ldr     r1, [r0, #{from}]       @ from 为 0：首次启动，无需保存
    cmp     r1, #0
    beq     5f
    mrs     r1, psp
    stmdb   r1!, {{r4 - r11}}
    movs    r4, #0
    stmdb   r1!, {{r4, r5}}         @ flag, reserved
    ldr     r3, [r0, #{from}]
    str     r1, [r3]                @ *from = sp

5:
    movs    r1, #0
    str     r1, [r0, #{pending}]
    ldr     r1, [r0, #{to}]
    ldr     r1, [r1]                @ sp = *to
    ldmia   r1!, {{r3, r12}}        @ flag, reserved
    ldmia   r1!, {{r4 - r11}}
    msr     psp, r1

2:
    msr     PRIMASK, r2
    orr     lr, lr, #0x04           @ 返回 Thread 模式并使用 PSP
    bx      lr
    ",
    from = const PORT_FROM,
    to = const PORT_TO,
    pending = const PORT_PENDING,
    state = const PORT_STATE,
);

#[cfg(feature = "fpu")]
global_asm!(
    "
    .syntax unified
    .section .text.PendSV,\"ax\",%progbits
    .global PendSV
    .type PendSV,%function
    .thumb_func
PendSV:
    mrs     r2, PRIMASK
    cpsid   i

    movw    r0, #:lower16:PORT
    movt    r0, #:upper16:PORT
    ldrb    r1, [r0, #{state}]
    cmp     r1, #0
    bne     2f
    ldr     r1, [r0, #{pending}]
    cmp     r1, #0
    beq     2f

    ldr     r1, [r0, #{from}]
    cmp     r1, #0
    beq     5f
    mrs     r1, psp
    tst     lr, #0x10               @ EXC_RETURN[4] == 0：线程用过浮点
    it      eq
    vstmdbeq r1!, {{d8 - d15}}      @ s16 ~ s31
    stmdb   r1!, {{r4 - r11}}
    movs    r4, #0
    tst     lr, #0x10
    it      eq
    moveq   r4, #1
    stmdb   r1!, {{r4, r5}}         @ flag, reserved
    ldr     r3, [r0, #{from}]
    str     r1, [r3]

5:
    movs    r1, #0
    str     r1, [r0, #{pending}]
    ldr     r1, [r0, #{to}]
    ldr     r1, [r1]
    ldmia   r1!, {{r3, r12}}
    ldmia   r1!, {{r4 - r11}}
    cmp     r3, #0
    it      ne
    vldmiane r1!, {{d8 - d15}}
    msr     psp, r1
    orr     lr, lr, #0x10           @ 基本异常帧
    cmp     r3, #0
    it      ne
    bicne   lr, lr, #0x10           @ 扩展异常帧

2:
    msr     PRIMASK, r2
    orr     lr, lr, #0x04
    bx      lr
    ",
    from = const PORT_FROM,
    to = const PORT_TO,
    pending = const PORT_PENDING,
    state = const PORT_STATE,
);

global_asm!(
    "
    .syntax unified
    .section .text.port_start_first,\"ax\",%progbits
    .global port_start_first
    .type port_start_first,%function
    .thumb_func
port_start_first:
    ldr     r0, ={shpr3}            @ PendSV / SysTick 最低优先级
    ldr     r1, [r0]
    ldr     r2, ={lowest}
    orr     r1, r1, r2
    str     r1, [r0]

    mrs     r2, CONTROL             @ 清除 FPCA，首个线程从基本帧开始
    bic     r2, r2, #{fpca}
    msr     CONTROL, r2
    isb

    ldr     r0, ={icsr}             @ 挂起 PendSV
    ldr     r1, ={pendsvset}
    str     r1, [r0]

    ldr     r0, ={vtor}             @ 用向量表首项复位 MSP
    ldr     r0, [r0]
    ldr     r0, [r0]
    msr     msp, r0

    cpsie   f
    cpsie   i
    dsb
    isb
9:
    b       9b
    .ltorg
    ",
    shpr3 = const SCB_SHPR3,
    lowest = const SHPR3_LOWEST,
    icsr = const SCB_ICSR,
    pendsvset = const ICSR_PENDSVSET,
    vtor = const SCB_VTOR,
    fpca = const CONTROL_FPCA,
);
