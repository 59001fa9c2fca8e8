// mado-gfx — フレームバッファ・コンポジタのコア
//
// カーネルから切り離した描画ロジック一式。ハードウェアには触らないので、
// ホスト上で `cargo test` できる。
//
// 下から順に:
//   graphics     — 色・座標・矩形・PixelWriter と基本図形
//   font         — font8x8 を使ったグリフ描画
//   frame_buffer — 線形ピクセルメモリ（所有 or 借用）とブロック転送
//   window       — オフスクリーン描画面 + シャドウバッファ
//   layer        — ウィンドウの配置と重ね順、合成
//   console      — 文字グリッドとスクロール
//   mouse        — カーソル移動とドラッグ

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod console;
pub mod error;
pub mod font;
pub mod frame_buffer;
pub mod graphics;
pub mod layer;
pub mod mouse;
pub mod window;

pub use console::{Console, ConsoleTarget, SharedWriter};
pub use error::{Error, ErrorCode, Result};
pub use frame_buffer::{FrameBuffer, FrameBufferConfig};
pub use graphics::{PixelColor, PixelFormat, PixelWriter, Rectangle, Vector2D};
pub use layer::{Layer, LayerId, LayerManager};
pub use mouse::Mouse;
pub use window::{SharedWindow, Window};
