//! # 位扫描
//!
//! 调度器就绪位图使用的 find-first-set：返回最低置位位的序号（从 1 开始），
//! 输入为 0 时返回 0。
//!
//! 按构建脚本给出的 cfg 选择实现：
//! - `ffs_table`：没有原生位扫描指令的核（ARMv6-M）或启用了 `ffs-table` 特性，逐字节查表
//! - `armv7m`：`rbit` + `clz` 两条指令
//! - 其余平台：`trailing_zeros`

/// 最低置位位的序号（1 ~ 32），`value == 0` 时为 0
#[inline]
pub fn ffs(value: u32) -> u32 {
    #[cfg(ffs_table)]
    {
        ffs_table(value)
    }
    #[cfg(all(armv7m, not(ffs_table)))]
    {
        ffs_rbit(value)
    }
    #[cfg(not(any(armv7m, ffs_table)))]
    {
        ffs_builtin(value)
    }
}

#[cfg(all(armv7m, not(ffs_table)))]
#[inline]
fn ffs_rbit(value: u32) -> u32 {
    if value == 0 {
        return 0;
    }
    let zeros: u32;
    unsafe {
        core::arch::asm!(
            "rbit {0}, {1}",
            "clz {0}, {0}",
            out(reg) zeros,
            in(reg) value,
            options(pure, nomem, nostack),
        );
    }
    zeros + 1
}

#[inline]
pub fn ffs_builtin(value: u32) -> u32 {
    if value == 0 {
        0
    } else {
        value.trailing_zeros() + 1
    }
}

/// 每个字节最低置位位的序号（从 0 开始），0 的表项无意义
static LOWEST_BIT: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 1;
    while i < 256 {
        let mut n = i;
        let mut bit = 0;
        while n & 1 == 0 {
            n >>= 1;
            bit += 1;
        }
        table[i] = bit;
        i += 1;
    }
    table
};

/// 逐字节查表
pub fn ffs_table(value: u32) -> u32 {
    if value == 0 {
        return 0;
    }
    let mut shift = 0;
    while (value >> shift) & 0xFF == 0 {
        shift += 8;
    }
    LOWEST_BIT[((value >> shift) & 0xFF) as usize] as u32 + shift + 1
}
