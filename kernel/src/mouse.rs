// mouse.rs — PS/2 マウスドライバ
//
// i8042 コントローラの補助ポートを有効にして、ストリーミングモードで
// 3 バイトパケットを IRQ12 で受け取る。コマンドの順番とパケットの解釈は
// mado_ps2 にあり、ここはポート I/O をつなぐだけ。
//
// 位置の管理はしない。移動量とボタンを PointerReport にして返すだけ。
// カーソルの位置やドラッグは mado_gfx::Mouse が受け持つ。

use mado_ps2::{Controller, MouseInitError, PacketDecoder, PointerReport};
use spin::Mutex;
use x86_64::instructions::port::Port;

const STATUS_PORT: u16 = 0x64;
const CMD_PORT: u16 = 0x64;
const DATA_PORT: u16 = 0x60;

/// ステータスを待つ上限回数。実機でコントローラが無いときに固まらないように。
const WAIT_LIMIT: usize = 100_000;

/// 本物の i8042
struct I8042;

impl Controller for I8042 {
    fn read_status(&mut self) -> u8 {
        unsafe { Port::<u8>::new(STATUS_PORT).read() }
    }

    fn read_data(&mut self) -> u8 {
        unsafe { Port::<u8>::new(DATA_PORT).read() }
    }

    fn write_command(&mut self, cmd: u8) {
        unsafe { Port::<u8>::new(CMD_PORT).write(cmd) }
    }

    fn write_data(&mut self, data: u8) {
        unsafe { Port::<u8>::new(DATA_PORT).write(data) }
    }
}

static DECODER: Mutex<PacketDecoder> = Mutex::new(PacketDecoder::new());

/// マウスを有効にする。割り込みを有効にする前に呼ぶ。
///
/// キーボードポートはここで止める。IRQ1 は PIC でもマスクしているので、
/// 止めずにキーを押されると出力バッファが埋まってマウスが動かなくなる。
pub fn init() -> Result<(), MouseInitError> {
    mado_ps2::init_mouse(&mut I8042, WAIT_LIMIT)?;
    log::info!("mouse: PS/2 streaming enabled (keyboard port disabled)");
    Ok(())
}

/// IRQ12 ハンドラから 1 バイトずつ渡す。パケットが揃ったらレポートを返す。
pub fn handle_irq_byte(byte: u8) -> Option<PointerReport> {
    DECODER.lock().feed(byte)
}
