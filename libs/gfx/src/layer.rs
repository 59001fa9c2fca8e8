// layer.rs — レイヤーと重ね合わせ
//
// Layer は Window を画面上のどこに置くかを表す。LayerManager は
// レイヤーを ID で持ち、奥から手前への並び（スタック）を管理して、
// 合成用のバックバッファへ奥から順に描き重ねる。
//
// 合成はすべてメモリ上で行い、描いた範囲を dirty として覚えておく。
// 呼び出し側は take_dirty() で受け取った範囲だけを実画面へ 1 回コピーすればよい。
// 画面に途中経過が見えないのでちらつきが出ない。
//
// move / up_down は状態を変えるだけで再描画はしない。
// 複数のレイヤーを動かしてから 1 回だけ draw する使い方ができる。

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::{Error, ErrorCode, Result};
use crate::frame_buffer::{FrameBuffer, FrameBufferConfig};
use crate::graphics::{PixelFormat, Rectangle, Vector2D};
use crate::window::SharedWindow;

/// レイヤー ID。0 は使わない。
pub type LayerId = u32;

pub struct Layer {
    id: LayerId,
    pos: Vector2D,
    window: Option<SharedWindow>,
    draggable: bool,
}

impl Layer {
    fn new(id: LayerId) -> Self {
        Self {
            id,
            pos: Vector2D::ZERO,
            window: None,
            draggable: false,
        }
    }

    pub fn id(&self) -> LayerId {
        self.id
    }

    pub fn position(&self) -> Vector2D {
        self.pos
    }

    /// ウィンドウを差し替える。再描画はしない。
    pub fn set_window(&mut self, window: SharedWindow) -> &mut Self {
        self.window = Some(window);
        self
    }

    pub fn window(&self) -> Option<&SharedWindow> {
        self.window.as_ref()
    }

    pub fn move_to(&mut self, pos: Vector2D) -> &mut Self {
        self.pos = pos;
        self
    }

    pub fn move_relative(&mut self, delta: Vector2D) -> &mut Self {
        self.pos += delta;
        self
    }

    pub fn set_draggable(&mut self, draggable: bool) -> &mut Self {
        self.draggable = draggable;
        self
    }

    pub fn is_draggable(&self) -> bool {
        self.draggable
    }

    /// 画面上で占める矩形。ウィンドウが無ければ None。
    pub fn bounds(&self) -> Option<Rectangle> {
        let window = self.window.as_ref()?;
        let size = window.lock().size();
        Some(Rectangle::new(self.pos, size))
    }

    fn draw_to(&self, dst: &mut FrameBuffer, area: &Rectangle) -> Result<()> {
        match &self.window {
            Some(window) => window.lock().draw_to(dst, self.pos, area),
            None => Ok(()),
        }
    }
}

pub struct LayerManager {
    layers: BTreeMap<LayerId, Layer>,
    /// 奥 (index 0) から手前への並び
    stack: Vec<LayerId>,
    latest_id: LayerId,
    back_buffer: FrameBuffer,
    dirty: Option<Rectangle>,
}

impl LayerManager {
    /// 合成先のバックバッファを画面と同じ構成で確保する。
    pub fn new(screen: FrameBufferConfig) -> Result<Self> {
        Ok(Self {
            layers: BTreeMap::new(),
            stack: Vec::new(),
            latest_id: 0,
            back_buffer: FrameBuffer::new(screen)?,
            dirty: None,
        })
    }

    /// 新しいレイヤーを作る。ID は単調増加で、削除後も再利用しない。
    pub fn new_layer(&mut self) -> &mut Layer {
        self.latest_id += 1;
        let id = self.latest_id;
        log::debug!("layer: new layer {}", id);
        self.layers.entry(id).or_insert_with(|| Layer::new(id))
    }

    #[track_caller]
    pub fn layer(&self, id: LayerId) -> Result<&Layer> {
        self.layers.get(&id).ok_or_else(|| Error::new(ErrorCode::UnknownLayer))
    }

    #[track_caller]
    pub fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer> {
        self.layers.get_mut(&id).ok_or_else(|| Error::new(ErrorCode::UnknownLayer))
    }

    /// 位置を変える。再描画は呼び出し側が draw で行う。
    #[track_caller]
    pub fn move_to(&mut self, id: LayerId, pos: Vector2D) -> Result<()> {
        self.layer_mut(id)?.move_to(pos);
        Ok(())
    }

    #[track_caller]
    pub fn move_relative(&mut self, id: LayerId, delta: Vector2D) -> Result<()> {
        self.layer_mut(id)?.move_relative(delta);
        Ok(())
    }

    /// スタック内の高さを変える。0 が最奥。
    ///
    /// 負の値なら非表示にする。スタックの長さを超える値は最前面に丸める。
    #[track_caller]
    pub fn up_down(&mut self, id: LayerId, new_height: i32) -> Result<()> {
        if new_height < 0 {
            return self.hide(id);
        }
        self.layer(id)?;

        let requested = new_height as usize;
        // 既にスタックにいるレイヤーは、いったん抜いてから入れ直すので
        // 入れられる位置は len - 1 まで。新しく入るレイヤーは末尾 (len) まで。
        // どちらも大きすぎる値は最前面として扱う（マウスカーソルは i32::MAX を渡す）。
        match self.stack.iter().position(|&l| l == id) {
            Some(old) => {
                let height = requested.min(self.stack.len() - 1);
                self.stack.remove(old);
                self.stack.insert(height, id);
            }
            None => {
                let height = requested.min(self.stack.len());
                self.stack.insert(height, id);
            }
        }
        Ok(())
    }

    /// スタックから外す。レイヤー自体は残るので up_down で再表示できる。
    #[track_caller]
    pub fn hide(&mut self, id: LayerId) -> Result<()> {
        self.layer(id)?;
        self.stack.retain(|&l| l != id);
        Ok(())
    }

    /// 表示中なら高さを返す。
    pub fn height(&self, id: LayerId) -> Option<usize> {
        self.stack.iter().position(|&l| l == id)
    }

    /// area と重なる表示中のレイヤーを奥から順にバックバッファへ描く。
    pub fn draw(&mut self, area: &Rectangle) -> Result<()> {
        // 画面外は描く意味が無いし、dirty に入ると present が無駄なコピーをする
        let screen = Rectangle::new(Vector2D::ZERO, self.back_buffer.size());
        let area = *area & screen;
        if area.is_empty() {
            return Ok(());
        }

        // 奥から順に上書きしていく（画家のアルゴリズム）。
        // area と重ならないレイヤーはウィンドウのロックも取らずに飛ばす。
        // 手前のレイヤーを描く前に奥のレイヤーを描くので、
        // 透過色のあるウィンドウ（マウスカーソル）の下も正しく見える。
        for id in &self.stack {
            let Some(layer) = self.layers.get(id) else {
                continue;
            };
            let overlaps = layer.bounds().is_some_and(|b| !(b & area).is_empty());
            if overlaps {
                layer.draw_to(&mut self.back_buffer, &area)?;
            }
        }

        // 複数回 draw してから 1 回 present する使い方のために、
        // 描いた範囲は外接矩形としてまとめておく
        self.dirty = Some(match self.dirty {
            Some(old) => old.union(&area),
            None => area,
        });
        Ok(())
    }

    /// レイヤー 1 枚の範囲だけを描き直す。
    ///
    /// 範囲内では上下のレイヤーも含めてスタック全体を描くので、
    /// 重なり順はそのまま保たれる。
    #[track_caller]
    pub fn draw_layer(&mut self, id: LayerId) -> Result<()> {
        match self.layer(id)?.bounds() {
            Some(bounds) => self.draw(&bounds),
            None => Ok(()),
        }
    }

    /// pos を含むレイヤーを手前から探す。exclude は無視する（マウスカーソル自身など）。
    ///
    /// 非表示のレイヤーはスタックにいないので当たらない。
    /// 透過色のピクセルでも当たり判定はウィンドウの矩形で行う。
    pub fn find_layer_by_position(&self, pos: Vector2D, exclude: Option<LayerId>) -> Option<LayerId> {
        self.stack
            .iter()
            .rev()
            .copied()
            .filter(|&id| Some(id) != exclude)
            .find(|id| {
                self.layers
                    .get(id)
                    .and_then(Layer::bounds)
                    .is_some_and(|b| b.contains(pos))
            })
    }

    /// 前回から描いた範囲を返してリセットする。
    pub fn take_dirty(&mut self) -> Option<Rectangle> {
        self.dirty.take()
    }

    /// 合成済みのバックバッファ
    pub fn buffer(&self) -> &FrameBuffer {
        &self.back_buffer
    }

    pub fn format(&self) -> PixelFormat {
        self.back_buffer.format()
    }

    pub fn screen_size(&self) -> Vector2D {
        self.back_buffer.size()
    }
}
