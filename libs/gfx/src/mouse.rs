// mouse.rs — マウスカーソルとドラッグ
//
// ポインタデバイスからの (ボタン, dx, dy) を受け取り、カーソルのレイヤーを動かす。
// 左ボタンの押下/保持/解放の遷移を見て、ドラッグ可能なレイヤーを掴んで動かす。
//
//   離 → 押: 移動前の位置でヒットテストし、ドラッグ可能なら掴む
//   押 → 押: 掴んでいればカーソルと同じだけ動かす
//   押 → 離: 離す
//
// 左ボタン以外のビットは記録するだけで使わない。

use crate::error::Result;
use crate::graphics::{PixelColor, PixelWriter, Rectangle, Vector2D};
use crate::layer::{LayerId, LayerManager};
use crate::window::Window;

pub const MOUSE_CURSOR_WIDTH: i32 = 15;
pub const MOUSE_CURSOR_HEIGHT: i32 = 24;
/// カーソル画像の透過色。カーソル本体には使わない色にしておく。
pub const MOUSE_TRANSPARENT_COLOR: PixelColor = PixelColor::new(0, 0, 1);

const LEFT_BUTTON: u8 = 0x01;

// '@' = 黒（縁）, '.' = 白（中）, ' ' = 透過
const MOUSE_CURSOR_SHAPE: [&[u8; MOUSE_CURSOR_WIDTH as usize]; MOUSE_CURSOR_HEIGHT as usize] = [
    b"@              ",
    b"@@             ",
    b"@.@            ",
    b"@..@           ",
    b"@...@          ",
    b"@....@         ",
    b"@.....@        ",
    b"@......@       ",
    b"@.......@      ",
    b"@........@     ",
    b"@.........@    ",
    b"@..........@   ",
    b"@...........@  ",
    b"@............@ ",
    b"@......@@@@@@@@",
    b"@......@       ",
    b"@....@@.@      ",
    b"@...@ @.@      ",
    b"@..@   @.@     ",
    b"@.@    @.@     ",
    b"@@      @.@    ",
    b"@       @.@    ",
    b"         @.@   ",
    b"         @@@   ",
];

/// pos を左上としてカーソル画像を描く。透過部分は MOUSE_TRANSPARENT_COLOR で塗る。
pub fn draw_mouse_cursor<W: PixelWriter + ?Sized>(writer: &mut W, pos: Vector2D) {
    for (dy, row) in MOUSE_CURSOR_SHAPE.iter().enumerate() {
        for (dx, &ch) in row.iter().enumerate() {
            let c = match ch {
                b'@' => PixelColor::new(0, 0, 0),
                b'.' => PixelColor::new(255, 255, 255),
                _ => MOUSE_TRANSPARENT_COLOR,
            };
            writer.write(pos + Vector2D::new(dx as i32, dy as i32), c);
        }
    }
}

pub struct Mouse {
    layer_id: LayerId,
    pos: Vector2D,
    previous_buttons: u8,
    drag_layer_id: Option<LayerId>,
}

impl Mouse {
    /// layer_id はカーソル自身のレイヤー。ヒットテストから除外される。
    pub fn new(layer_id: LayerId, pos: Vector2D) -> Self {
        Self {
            layer_id,
            pos,
            previous_buttons: 0,
            drag_layer_id: None,
        }
    }

    /// カーソルのウィンドウとレイヤーを作って最前面に置き、Mouse を返す。
    pub fn install(layers: &mut LayerManager, pos: Vector2D) -> Result<Self> {
        let window = Window::new_shared(MOUSE_CURSOR_WIDTH, MOUSE_CURSOR_HEIGHT, layers.format())?;
        {
            let mut w = window.lock();
            w.set_transparent_color(Some(MOUSE_TRANSPARENT_COLOR));
            draw_mouse_cursor(&mut *w, Vector2D::ZERO);
        }

        let id = layers.new_layer().set_window(window).move_to(pos).id();
        layers.up_down(id, i32::MAX)?;
        layers.draw_layer(id)?;
        log::debug!("mouse: cursor layer {} at ({}, {})", id, pos.x, pos.y);
        Ok(Self::new(id, pos))
    }

    pub fn layer_id(&self) -> LayerId {
        self.layer_id
    }

    pub fn position(&self) -> Vector2D {
        self.pos
    }

    /// ドラッグ中のレイヤー
    pub fn dragging(&self) -> Option<LayerId> {
        self.drag_layer_id
    }

    /// ポインタの 1 レポートを処理する。
    ///
    /// 位置は画面内に丸める。動いたレイヤーは移動前と移動後を合わせた範囲を再描画する。
    pub fn on_pointer_event(&mut self, layers: &mut LayerManager, buttons: u8, dx: i8, dy: i8) -> Result<()> {
        let cursor_before = layers.layer(self.layer_id)?.bounds();

        let screen = layers.screen_size();
        let old_pos = self.pos;
        let moved = old_pos + Vector2D::new(i32::from(dx), i32::from(dy));
        self.pos = Vector2D::new(
            moved.x.clamp(0, (screen.x - 1).max(0)),
            moved.y.clamp(0, (screen.y - 1).max(0)),
        );
        let diff = self.pos - old_pos;
        layers.move_to(self.layer_id, self.pos)?;

        let previous_left = self.previous_buttons & LEFT_BUTTON != 0;
        let left = buttons & LEFT_BUTTON != 0;
        let mut dragged = None;
        match (previous_left, left) {
            (false, true) => {
                self.drag_layer_id = layers
                    .find_layer_by_position(old_pos, Some(self.layer_id))
                    .filter(|&id| layers.layer(id).is_ok_and(|l| l.is_draggable()));
                if let Some(id) = self.drag_layer_id {
                    log::debug!("mouse: start dragging layer {}", id);
                }
            }
            (true, true) => {
                if let Some(id) = self.drag_layer_id {
                    let before = layers.layer(id)?.bounds();
                    layers.move_relative(id, diff)?;
                    dragged = Some((id, before));
                }
            }
            (true, false) => self.drag_layer_id = None,
            (false, false) => {}
        }
        self.previous_buttons = buttons;

        if diff == Vector2D::ZERO {
            return Ok(());
        }
        if let Some((id, before)) = dragged {
            redraw_moved(layers, id, before)?;
        }
        redraw_moved(layers, self.layer_id, cursor_before)
    }
}

/// 移動前の範囲と現在の範囲をまとめて描き直す。
fn redraw_moved(layers: &mut LayerManager, id: LayerId, before: Option<Rectangle>) -> Result<()> {
    let after = layers.layer(id)?.bounds();
    let area = match (before, after) {
        (Some(b), Some(a)) => b.union(&a),
        (Some(r), None) | (None, Some(r)) => r,
        (None, None) => return Ok(()),
    };
    layers.draw(&area)
}
