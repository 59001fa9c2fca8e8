// mado-ps2 — PS/2 (i8042) マウスのプロトコル部分
//
// ポート I/O そのものはカーネル側が Controller トレイトとして実装する。
// ここにあるのはコマンドの順番とパケットの解釈だけなので、
// 偽のコントローラを使ってホストでテストできる。
//
// i8042 は出力バッファ（ポート 0x60）を 1 バイトしか持たず、キーボードと
// マウスで共有している。キーボード側のバイトを誰も読まないと出力バッファが
// 埋まったままになり、マウスのバイトが届かなくなる（IRQ12 が二度と来ない）。
// このカーネルはキーボードを使わないので、初期化の最初でキーボードポートを
// 止め、残っているバイトを読み捨て、構成バイトで IRQ1 も切っておく。

#![no_std]

/// ポインタデバイス 1 レポート分
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerReport {
    /// bit0 左, bit1 右, bit2 中
    pub buttons: u8,
    pub dx: i8,
    /// 画面座標と同じく下が正
    pub dy: i8,
}

/// i8042 のステータスレジスタ
pub const STATUS_OUTPUT_FULL: u8 = 0x01;
pub const STATUS_INPUT_FULL: u8 = 0x02;

/// コントローラへのコマンド（ポート 0x64）
pub const CMD_READ_CONFIG: u8 = 0x20;
pub const CMD_WRITE_CONFIG: u8 = 0x60;
pub const CMD_DISABLE_KEYBOARD: u8 = 0xAD;
pub const CMD_ENABLE_AUX: u8 = 0xA8;
pub const CMD_WRITE_MOUSE: u8 = 0xD4;

/// 構成バイト
pub const CONFIG_KEYBOARD_IRQ: u8 = 0x01;
pub const CONFIG_AUX_IRQ: u8 = 0x02;
pub const CONFIG_AUX_CLOCK_DISABLED: u8 = 0x20;

/// マウスへのコマンド（0xD4 の後にデータポートへ書く）
pub const MOUSE_SET_DEFAULTS: u8 = 0xF6;
pub const MOUSE_ENABLE_STREAMING: u8 = 0xF4;
pub const MOUSE_ACK: u8 = 0xFA;

/// i8042 のレジスタへの生アクセス
pub trait Controller {
    fn read_status(&mut self) -> u8;
    fn read_data(&mut self) -> u8;
    fn write_command(&mut self, cmd: u8);
    fn write_data(&mut self, data: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseInitError {
    /// ステータスが wait_limit 回読んでも変わらなかった
    Timeout,
    /// マウスが ACK 以外を返した
    NoAck(u8),
}

/// マウスをストリーミングモードにする。
///
/// wait_limit はステータスを読む上限回数。実機でコントローラが無いときに
/// 固まらないようにするためのもの。
pub fn init_mouse<C: Controller>(ctrl: &mut C, wait_limit: usize) -> Result<(), MouseInitError> {
    let mut ps2 = Ps2 { ctrl, wait_limit };

    // キーボードポートを止めてから、ファームウェアや押されたキーの
    // 残りバイトを捨てる。順番が逆だと捨てた直後にまた溜まりうる。
    ps2.command(CMD_DISABLE_KEYBOARD)?;
    let drained = ps2.drain_output();
    if drained > 0 {
        log::debug!("ps2: drained {} stale bytes", drained);
    }

    ps2.command(CMD_ENABLE_AUX)?;

    ps2.command(CMD_READ_CONFIG)?;
    let config = ps2.read()?;
    let config = (config | CONFIG_AUX_IRQ) & !(CONFIG_KEYBOARD_IRQ | CONFIG_AUX_CLOCK_DISABLED);
    ps2.command(CMD_WRITE_CONFIG)?;
    ps2.write(config)?;

    ps2.mouse_command(MOUSE_SET_DEFAULTS)?;
    ps2.mouse_command(MOUSE_ENABLE_STREAMING)?;
    Ok(())
}

/// ステータス待ち付きの操作
struct Ps2<'a, C> {
    ctrl: &'a mut C,
    wait_limit: usize,
}

impl<C: Controller> Ps2<'_, C> {
    fn command(&mut self, cmd: u8) -> Result<(), MouseInitError> {
        self.wait(|s| s & STATUS_INPUT_FULL == 0)?;
        self.ctrl.write_command(cmd);
        Ok(())
    }

    fn write(&mut self, data: u8) -> Result<(), MouseInitError> {
        self.wait(|s| s & STATUS_INPUT_FULL == 0)?;
        self.ctrl.write_data(data);
        Ok(())
    }

    fn read(&mut self) -> Result<u8, MouseInitError> {
        self.wait(|s| s & STATUS_OUTPUT_FULL != 0)?;
        Ok(self.ctrl.read_data())
    }

    fn mouse_command(&mut self, cmd: u8) -> Result<(), MouseInitError> {
        self.command(CMD_WRITE_MOUSE)?;
        self.write(cmd)?;
        match self.read()? {
            MOUSE_ACK => Ok(()),
            other => Err(MouseInitError::NoAck(other)),
        }
    }

    /// 出力バッファが空になるまで読み捨てる。読んだバイト数を返す。
    fn drain_output(&mut self) -> usize {
        let mut count = 0;
        while count < self.wait_limit && self.ctrl.read_status() & STATUS_OUTPUT_FULL != 0 {
            self.ctrl.read_data();
            count += 1;
        }
        count
    }

    fn wait(&mut self, ready: impl Fn(u8) -> bool) -> Result<(), MouseInitError> {
        for _ in 0..self.wait_limit {
            if ready(self.ctrl.read_status()) {
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(MouseInitError::Timeout)
    }
}

/// 3 バイトパケットを組み立てる。
///
///   byte0: bit0-2 ボタン, bit3 常に 1, bit4/5 X/Y の符号, bit6/7 オーバーフロー
///   byte1: X 移動量の下位 8 ビット
///   byte2: Y 移動量の下位 8 ビット（上が正）
pub struct PacketDecoder {
    packet: [u8; 3],
    index: usize,
}

impl PacketDecoder {
    pub const fn new() -> Self {
        Self { packet: [0; 3], index: 0 }
    }

    /// 1 バイト渡す。パケットが揃ったらレポートを返す。
    pub fn feed(&mut self, byte: u8) -> Option<PointerReport> {
        // 先頭バイトは bit3 が必ず立っている。崩れていたら捨てて同期を取り直す。
        if self.index == 0 && byte & 0x08 == 0 {
            return None;
        }
        self.packet[self.index] = byte;
        self.index += 1;
        if self.index < 3 {
            return None;
        }
        self.index = 0;

        let [flags, x, y] = self.packet;
        if flags & 0xC0 != 0 {
            return None;
        }
        let dx = sign_extend(x, flags & 0x10 != 0);
        let dy = -sign_extend(y, flags & 0x20 != 0);
        Some(PointerReport {
            buttons: flags & 0x07,
            dx: saturate(dx),
            dy: saturate(dy),
        })
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// 9 ビットの移動量を i32 に
fn sign_extend(low: u8, negative: bool) -> i32 {
    if negative { i32::from(low) - 256 } else { i32::from(low) }
}

fn saturate(v: i32) -> i8 {
    v.clamp(i32::from(i8::MIN), i32::from(i8::MAX)) as i8
}
