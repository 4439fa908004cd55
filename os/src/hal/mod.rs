pub mod arch;

pub use arch::config::*;
pub use arch::{disable_interrupts, enable_interrupts, interrupts_enabled, halt};
pub use arch::{interrupt_disable, interrupt_enable};
pub use arch::{pend_switch, start_first};
pub use arch::{IntrMaskingInfo, INTR_MASKING_INFO};
