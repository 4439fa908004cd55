//! # 控制台与日志
//!
//! 输出写到通过 [`set_sink`] 注册的 `fmt::Write` 上（通常是板级 UART 或 RTT 通道），
//! 没有注册时丢弃。`log` 门面的实现也走这里。

use core::fmt::{self, Write};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

type Sink = &'static mut (dyn Write + Send);

static SINK: Mutex<Option<Sink>> = Mutex::new(None);

/// 注册控制台输出
pub fn set_sink(sink: Sink) {
    *SINK.lock() = Some(sink);
}

/// 放弃等待 sink 之前的自旋次数
const SINK_SPIN_LIMIT: usize = 1 << 20;

pub fn print(args: fmt::Arguments) {
    // 故障路径上锁可能被打断的代码持有，等不到就放弃这次输出
    for _ in 0..SINK_SPIN_LIMIT {
        if let Some(mut sink) = SINK.try_lock() {
            if let Some(sink) = sink.as_mut() {
                let _ = sink.write_fmt(args);
            }
            return;
        }
        core::hint::spin_loop();
    }
}

#[macro_export]
macro_rules! print {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!($fmt $(, $($arg)+)?))
    }
}

#[macro_export]
macro_rules! println {
    ($fmt: literal) => {
        $crate::console::print(format_args!(concat!($fmt, "\n")))
    };
    ($fmt: literal, $($arg: tt)*) => {
        $crate::console::print(format_args!(concat!($fmt, "\n"), $($arg)*))
    };
}

/// 安装日志实现，级别由编译期环境变量 `LOG` 决定，默认关闭
pub fn init() -> Result<(), SetLoggerError> {
    static LOGGER: Logger = Logger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(level_filter(option_env!("LOG")));
    Ok(())
}

fn level_filter(name: Option<&str>) -> LevelFilter {
    match name {
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

struct Logger;

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        println!(
            "\x1b[{}m[{:>5}] {}\x1b[0m",
            level_to_color_code(record.level()),
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {}
}

fn level_to_color_code(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 34,  // Blue
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static CAPTURED: Mutex<String> = Mutex::new(String::new());

    struct Capture;

    impl Write for Capture {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            CAPTURED.lock().push_str(s);
            Ok(())
        }
    }

    #[test]
    fn level_names() {
        assert_eq!(level_filter(Some("warn")), LevelFilter::Warn);
        assert_eq!(level_filter(Some("trace")), LevelFilter::Trace);
        assert_eq!(level_filter(Some("loud")), LevelFilter::Off);
        assert_eq!(level_filter(None), LevelFilter::Off);
    }

    // 唯一一个注册 sink 的测试；其他测试并行产生的输出也会进来，只检查包含关系
    #[test]
    fn output_reaches_the_sink() {
        use crate::context::{CalleeSaved, Port, SavedContext};
        use crate::fault::{diagnose, Cfsr, FaultKind, FaultRegisters, FaultSnapshot, Hfsr};
        use crate::hal::EXC_RETURN_THREAD_PSP;

        print!("dropped ");
        set_sink(Box::leak(Box::new(Capture)));
        println!("sp={:#x}", 0x2000_0100);

        Logger.log(
            &Record::builder()
                .level(Level::Error)
                .args(format_args!("HardFault on thread"))
                .build(),
        );

        struct Status;
        impl FaultRegisters for Status {
            fn cfsr(&self) -> u32 {
                Cfsr::UNDEFINSTR.bits()
            }
            fn hfsr(&self) -> u32 {
                Hfsr::FORCED.bits()
            }
            fn mmfar(&self) -> u32 {
                0
            }
            fn bfar(&self) -> u32 {
                0
            }
        }
        // 日志级别保持关闭，故障报告仍要到达控制台
        let context = SavedContext {
            callee: CalleeSaved::from_array([0x4444_0004; 8]),
            ..Default::default()
        };
        let snapshot = FaultSnapshot::capture(&Status, EXC_RETURN_THREAD_PSP, context);
        diagnose(&Port::new(), FaultKind::UsageFault, snapshot, None);

        let out = CAPTURED.lock().clone();
        assert!(!out.contains("dropped"));
        assert!(out.contains("sp=0x20000100\n"));
        assert!(out.contains("\x1b[31m[ERROR] HardFault on thread\x1b[0m\n"));
        assert!(out.contains("[fault] UsageFault on thread"));
        assert!(out.contains("hfsr: 0x40000000 cfsr: 0x00010000"));
        assert!(out.contains("  - usage: undefined instruction"));
        assert!(out.contains("r04: 0x44440004"));
    }
}
