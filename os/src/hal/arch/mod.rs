pub mod config;
mod intr;

pub use intr::{IntrMaskingInfo, INTR_MASKING_INFO};

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use cortex_m::{
    disable_interrupts, enable_interrupts, halt, interrupt_disable, interrupt_enable,
    interrupts_enabled, pend_switch, start_first,
};

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub mod host;

#[cfg(not(all(target_arch = "arm", target_os = "none")))]
pub use host::{
    disable_interrupts, enable_interrupts, halt, interrupt_disable, interrupt_enable,
    interrupts_enabled, pend_switch, start_first,
};
