// logger.rs — log クレートの出力先
//
// log::info! などはすべてシリアルへ 1 行ずつ書き出す。
//   [<ticks>] LEVEL target: message
// ticks はタイマー割り込みの回数で、経過時間の目安になる。
//
// レベルは普段 Warn。verbose-log フィーチャで Debug まで出す。

use log::{LevelFilter, Log, Metadata, Record};

use crate::interrupts;

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

#[cfg(feature = "verbose-log")]
const MAX_LEVEL: LevelFilter = LevelFilter::Debug;
#[cfg(not(feature = "verbose-log"))]
const MAX_LEVEL: LevelFilter = LevelFilter::Warn;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        crate::serial_println!(
            "[{:>8}] {:<5} {}: {}",
            interrupts::ticks(),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// 2 回目以降の呼び出しはレベルの再設定だけになる。
pub fn init() {
    if log::set_logger(&LOGGER).is_err() {
        crate::serial_println!("logger: already installed");
    }
    log::set_max_level(MAX_LEVEL);
}
