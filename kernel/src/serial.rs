// serial.rs — COM1 (UART 16550) への出力
//
// ExitBootServices の後は UEFI の stdout が使えないので、ログはすべてここへ流す。
// QEMU なら `-serial stdio` でホストの端末に出てくる。
//
// レジスタ（ベース 0x3F8）:
//   +0 データ / 除数下位 (DLAB=1)
//   +1 割り込み有効 / 除数上位 (DLAB=1)
//   +2 FIFO 制御
//   +3 ライン制御
//   +4 モデム制御
//   +5 ライン状態

use core::fmt;
use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::instructions::port::{Port, PortReadOnly};

pub const COM1_BASE: u16 = 0x3F8;

/// ライン状態レジスタ: 送信保持レジスタが空
const LSR_THR_EMPTY: u8 = 0x20;

pub struct SerialPort {
    data: Port<u8>,
    int_enable: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_status: PortReadOnly<u8>,
}

impl SerialPort {
    pub const fn new(base: u16) -> Self {
        Self {
            data: Port::new(base),
            int_enable: Port::new(base + 1),
            fifo_ctrl: Port::new(base + 2),
            line_ctrl: Port::new(base + 3),
            modem_ctrl: Port::new(base + 4),
            line_status: PortReadOnly::new(base + 5),
        }
    }

    /// 115200 baud, 8N1, FIFO 有効。割り込みは使わない。
    pub fn init(&mut self) {
        unsafe {
            self.int_enable.write(0x00);
            self.line_ctrl.write(0x80); // DLAB
            self.data.write(0x01);
            self.int_enable.write(0x00);
            self.line_ctrl.write(0x03); // 8N1, DLAB クリア
            self.fifo_ctrl.write(0xC7);
            self.modem_ctrl.write(0x0B);
        }
    }

    pub fn write_byte(&mut self, byte: u8) {
        unsafe {
            while self.line_status.read() & LSR_THR_EMPTY == 0 {
                core::hint::spin_loop();
            }
            self.data.write(byte);
        }
    }
}

/// '\n' は '\r\n' にして送る。
impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r');
            }
            self.write_byte(byte);
        }
        Ok(())
    }
}

lazy_static! {
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut port = SerialPort::new(COM1_BASE);
        port.init();
        Mutex::new(port)
    };
}

/// ロック中に割り込みハンドラが同じロックを取りに来るとデッドロックするので、
/// 書いている間だけ割り込みを止める。
#[doc(hidden)]
pub fn _serial_print(args: fmt::Arguments) {
    use core::fmt::Write;
    x86_64::instructions::interrupts::without_interrupts(|| {
        let _ = SERIAL1.lock().write_fmt(args);
    });
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => ({
        $crate::serial::_serial_print(format_args!($($arg)*));
    });
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}
