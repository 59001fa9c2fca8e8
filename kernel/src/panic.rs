// panic.rs — パニックハンドラ
//
// ExitBootServices 後は UEFI の画面出力が使えないので、シリアルにだけ書いて止まる。
// 画面はレイヤー合成中に壊れている可能性があるので触らない。
//
// パニックは SERIAL1 を握ったまま起きることがある。
// try_lock() に失敗したら I/O ポートへ直接書く。

use core::fmt::{self, Write};
use core::panic::PanicInfo;

use x86_64::instructions::port::{Port, PortReadOnly};

use crate::serial::COM1_BASE;

/// Mutex を使わずに COM1 へ書く。
struct RawSerialWriter;

impl RawSerialWriter {
    fn write_byte(byte: u8) {
        let mut status: PortReadOnly<u8> = PortReadOnly::new(COM1_BASE + 5);
        let mut data: Port<u8> = Port::new(COM1_BASE);
        unsafe {
            while status.read() & 0x20 == 0 {
                core::hint::spin_loop();
            }
            data.write(byte);
        }
    }
}

impl fmt::Write for RawSerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                Self::write_byte(b'\r');
            }
            Self::write_byte(byte);
        }
        Ok(())
    }
}

fn report(w: &mut dyn Write, info: &PanicInfo) {
    let _ = w.write_str("\n==================== KERNEL PANIC ====================\n");
    let _ = writeln!(w, "{}", info);
    let _ = w.write_str("System halted.\n");
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();

    match crate::serial::SERIAL1.try_lock() {
        Some(mut serial) => report(&mut *serial, info),
        None => report(&mut RawSerialWriter, info),
    }

    crate::halt()
}
