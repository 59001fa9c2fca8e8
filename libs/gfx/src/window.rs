// window.rs — オフスクリーンの描画面
//
// Window は自分専用のピクセル配列（PixelColor の 2 次元配列）と、
// 画面と同じピクセルフォーマットのシャドウバッファを持つ。
// 書き込みは両方へ同時に反映するので、合成時はシャドウバッファを
// 行単位で memcpy するだけで済み、フォーマット変換が要らない。
//
// ウィンドウはレイヤーと作成元（コンソールなど）から共有されるので
// Arc<Mutex<Window>> で持ち回る。最後の参照が消えたときに解放される。

use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::error::{Error, ErrorCode, Result};
use crate::font::write_string;
use crate::frame_buffer::{try_alloc_zeroed, FrameBuffer, FrameBufferConfig};
use crate::graphics::{
    fill_rectangle, to_color, MovePlan, PixelColor, PixelFormat, PixelWriter, Rectangle, Vector2D,
};

/// 共有されたウィンドウ
pub type SharedWindow = Arc<Mutex<Window>>;

pub struct Window {
    width: i32,
    height: i32,
    /// 行優先のピクセル配列。長さは width * height。
    data: Vec<PixelColor>,
    shadow: FrameBuffer,
    transparent_color: Option<PixelColor>,
}

impl Window {
    /// shadow_format は合成先（画面）のピクセルフォーマットに合わせること。
    pub fn new(width: i32, height: i32, shadow_format: PixelFormat) -> Result<Self> {
        let width = width.max(0);
        let height = height.max(0);
        let len = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| Error::new(ErrorCode::AllocationFailed))?;
        let data = try_alloc_zeroed::<PixelColor>(len)?;
        let shadow = FrameBuffer::new(FrameBufferConfig::new(
            width as usize,
            height as usize,
            shadow_format,
        ))?;
        Ok(Self {
            width,
            height,
            data,
            shadow,
            transparent_color: None,
        })
    }

    /// 作ってすぐ共有する場合のショートカット。
    pub fn new_shared(width: i32, height: i32, shadow_format: PixelFormat) -> Result<SharedWindow> {
        Ok(Arc::new(Mutex::new(Self::new(width, height, shadow_format)?)))
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn size(&self) -> Vector2D {
        Vector2D::new(self.width, self.height)
    }

    /// 透過色を設定する。次の描画から効く。
    pub fn set_transparent_color(&mut self, c: Option<PixelColor>) {
        self.transparent_color = c;
    }

    pub fn transparent_color(&self) -> Option<PixelColor> {
        self.transparent_color
    }

    /// ウィンドウ座標 pos の色
    pub fn at(&self, pos: Vector2D) -> PixelColor {
        self.data[self.index(pos)]
    }

    /// dst の pos にこのウィンドウを置いたとして、画面座標 area の部分だけを描く。
    ///
    /// 透過色が無ければシャドウバッファをまとめてコピーする。
    /// 透過色があれば 1 ピクセルずつ見て、透過色以外だけを書き込む。
    pub fn draw_to(&self, dst: &mut FrameBuffer, pos: Vector2D, area: &Rectangle) -> Result<()> {
        let window_area = Rectangle::new(pos, self.size());
        let Some(tc) = self.transparent_color else {
            let intersection = *area & window_area;
            return dst.copy(
                intersection.pos,
                &self.shadow,
                Some(Rectangle::new(intersection.pos - pos, intersection.size)),
            );
        };

        let screen_area = Rectangle::new(Vector2D::ZERO, dst.size());
        let target = window_area & *area & screen_area;
        for y in target.pos.y..target.end().y {
            for x in target.pos.x..target.end().x {
                let p = Vector2D::new(x, y);
                let c = self.at(p - pos);
                if c != tc {
                    dst.write(p, c);
                }
            }
        }
        Ok(())
    }

    /// ウィンドウ内で src の矩形を dst_pos へずらす。
    ///
    /// 描画済みのピクセルをそのまま動かすので、テキストのスクロールで
    /// グリフを描き直さずに済む。ピクセル配列とシャドウバッファの両方を動かす。
    pub fn move_region(&mut self, dst_pos: Vector2D, src: &Rectangle) {
        self.shadow.move_region(dst_pos, src);

        let Some(plan) = MovePlan::new(self.size(), dst_pos, src) else {
            return;
        };
        let row_len = plan.src.size.x as usize;
        for (src_y, dst_y) in plan.rows() {
            let s = self.index(Vector2D::new(plan.src.pos.x, src_y));
            let d = self.index(Vector2D::new(plan.dst.x, dst_y));
            self.data.copy_within(s..s + row_len, d);
        }
    }

    fn index(&self, pos: Vector2D) -> usize {
        (pos.y * self.width + pos.x) as usize
    }
}

impl PixelWriter for Window {
    /// 範囲外への書き込みは呼び出し側のバグなので即座に止める。
    fn write(&mut self, pos: Vector2D, c: PixelColor) {
        assert!(
            pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height,
            "window write out of range: ({}, {}) in {}x{}",
            pos.x,
            pos.y,
            self.width,
            self.height
        );
        let idx = self.index(pos);
        self.data[idx] = c;
        self.shadow.write(pos, c);
    }

    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }
}

// 閉じるボタンの形。'@' = 黒, '$' = 影, ':' = 面, '.' = ハイライト
const CLOSE_BUTTON_WIDTH: i32 = 16;
const CLOSE_BUTTON_HEIGHT: i32 = 14;
const CLOSE_BUTTON: [&[u8; CLOSE_BUTTON_WIDTH as usize]; CLOSE_BUTTON_HEIGHT as usize] = [
    b"...............@",
    b".:::::::::::::$@",
    b".:::::::::::::$@",
    b".:::@@::::@@::$@",
    b".::::@@::@@:::$@",
    b".:::::@@@@::::$@",
    b".::::::@@:::::$@",
    b".:::::@@@@::::$@",
    b".::::@@::@@:::$@",
    b".:::@@::::@@::$@",
    b".:::::::::::::$@",
    b".:::::::::::::$@",
    b".$$$$$$$$$$$$$$@",
    b"@@@@@@@@@@@@@@@@",
];

/// ウィンドウの枠・タイトルバー・閉じるボタンを描く。
pub fn draw_window<W: PixelWriter + ?Sized>(writer: &mut W, title: &str) {
    let w = writer.width();
    let h = writer.height();
    let mut fill = |x: i32, y: i32, sw: i32, sh: i32, c: u32| {
        fill_rectangle(&mut *writer, Vector2D::new(x, y), Vector2D::new(sw, sh), to_color(c));
    };

    // 外側から順に: 明るい縁、暗い縁、面、タイトルバー
    fill(0, 0, w, 1, 0xc6c6c6);
    fill(1, 1, w - 2, 1, 0xffffff);
    fill(0, 0, 1, h, 0xc6c6c6);
    fill(1, 1, 1, h - 2, 0xffffff);
    fill(w - 2, 1, 1, h - 2, 0x848484);
    fill(w - 1, 0, 1, h, 0x000000);
    fill(2, 2, w - 4, h - 4, 0xc6c6c6);
    fill(3, 3, w - 6, 18, 0x000084);
    fill(1, h - 2, w - 2, 1, 0x848484);
    fill(0, h - 1, w, 1, 0x000000);

    write_string(
        writer,
        Vector2D::new(24, 4),
        title,
        to_color(0xffffff),
        to_color(0x000084),
    );

    let origin = Vector2D::new(w - 5 - CLOSE_BUTTON_WIDTH, 5);
    for (y, row) in CLOSE_BUTTON.iter().enumerate() {
        for (x, &ch) in row.iter().enumerate() {
            let c = match ch {
                b'@' => 0x000000,
                b'$' => 0x848484,
                b':' => 0xc6c6c6,
                _ => 0xffffff,
            };
            writer.write(origin + Vector2D::new(x as i32, y as i32), to_color(c));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RED: PixelColor = PixelColor::new(255, 0, 0);
    const KEY: PixelColor = PixelColor::new(0, 0, 1);
    const GRAY: PixelColor = PixelColor::new(9, 9, 9);

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle {
        Rectangle::new(Vector2D::new(x, y), Vector2D::new(w, h))
    }

    fn screen(w: usize, h: usize) -> FrameBuffer {
        let mut fb = FrameBuffer::new(FrameBufferConfig::new(w, h, PixelFormat::Rgb)).unwrap();
        fill_rectangle(&mut fb, Vector2D::ZERO, Vector2D::new(w as i32, h as i32), GRAY);
        fb
    }

    /// 市松模様に透過色を混ぜたウィンドウ
    fn checkered(w: i32, h: i32) -> Window {
        let mut win = Window::new(w, h, PixelFormat::Rgb).unwrap();
        for y in 0..h {
            for x in 0..w {
                let c = if (x + y) % 2 == 0 { KEY } else { PixelColor::new(x as u8, y as u8, 200) };
                win.write(Vector2D::new(x, y), c);
            }
        }
        win
    }

    #[test]
    fn test_write_updates_grid_and_shadow() {
        let mut win = Window::new(4, 4, PixelFormat::Bgr).unwrap();
        win.write(Vector2D::new(1, 2), RED);
        assert_eq!(win.at(Vector2D::new(1, 2)), RED);
        assert_eq!(win.shadow.pixel_at(Vector2D::new(1, 2)), Some(RED));
    }

    #[test]
    fn test_new_too_large_is_allocation_failed() {
        let result = Window::new(i32::MAX, i32::MAX, PixelFormat::Rgb);
        assert_eq!(result.err().map(|e| e.code()), Some(ErrorCode::AllocationFailed));
    }

    #[test]
    #[should_panic(expected = "window write out of range")]
    fn test_write_out_of_range_panics() {
        let mut win = Window::new(4, 4, PixelFormat::Rgb).unwrap();
        win.write(Vector2D::new(4, 0), RED);
    }

    #[test]
    fn test_opaque_draw_to_clips_to_area() {
        let mut win = Window::new(4, 4, PixelFormat::Rgb).unwrap();
        fill_rectangle(&mut win, Vector2D::ZERO, Vector2D::new(4, 4), RED);
        let mut dst = screen(10, 10);
        win.draw_to(&mut dst, Vector2D::new(2, 2), &rect(3, 3, 10, 10)).unwrap();
        assert_eq!(dst.pixel_at(Vector2D::new(2, 2)), Some(GRAY));
        assert_eq!(dst.pixel_at(Vector2D::new(3, 3)), Some(RED));
        assert_eq!(dst.pixel_at(Vector2D::new(5, 5)), Some(RED));
        assert_eq!(dst.pixel_at(Vector2D::new(6, 6)), Some(GRAY));
    }

    #[test]
    fn test_set_transparent_color_takes_effect_on_next_draw() {
        let mut win = checkered(2, 1);
        let mut dst = screen(2, 1);
        win.draw_to(&mut dst, Vector2D::ZERO, &rect(0, 0, 2, 1)).unwrap();
        assert_eq!(dst.pixel_at(Vector2D::ZERO), Some(KEY));

        let mut dst = screen(2, 1);
        win.set_transparent_color(Some(KEY));
        win.draw_to(&mut dst, Vector2D::ZERO, &rect(0, 0, 2, 1)).unwrap();
        assert_eq!(dst.pixel_at(Vector2D::ZERO), Some(GRAY));
    }

    #[test]
    fn test_move_region_keeps_grid_and_shadow_in_sync() {
        let mut win = checkered(6, 6);
        win.move_region(Vector2D::new(0, 0), &rect(0, 2, 6, 4));
        for y in 0..6 {
            for x in 0..6 {
                let p = Vector2D::new(x, y);
                assert_eq!(win.shadow.pixel_at(p), Some(win.at(p)));
            }
        }
        assert_eq!(win.at(Vector2D::new(1, 0)), checkered(6, 6).at(Vector2D::new(1, 2)));
    }

    #[test]
    fn test_draw_window_decoration() {
        let mut win = Window::new(160, 52, PixelFormat::Rgb).unwrap();
        draw_window(&mut win, "Hello Window");
        assert_eq!(win.at(Vector2D::new(0, 0)), to_color(0xc6c6c6));
        assert_eq!(win.at(Vector2D::new(159, 51)), to_color(0x000000));
        assert_eq!(win.at(Vector2D::new(10, 30)), to_color(0xc6c6c6));
        // 閉じるボタンの右下は黒
        assert_eq!(win.at(Vector2D::new(160 - 5 - 1, 5 + 13)), to_color(0x000000));
    }

    proptest! {
        #[test]
        fn prop_transparent_pixels_never_written(
            px in -8i32..12, py in -8i32..12,
            ax in -4i32..12, ay in -4i32..12, aw in 0i32..16, ah in 0i32..16,
        ) {
            let mut win = checkered(6, 5);
            win.set_transparent_color(Some(KEY));
            let mut dst = screen(10, 10);
            let pos = Vector2D::new(px, py);
            let area = rect(ax, ay, aw, ah);
            win.draw_to(&mut dst, pos, &area).unwrap();

            for y in 0..10 {
                for x in 0..10 {
                    let p = Vector2D::new(x, y);
                    let local = p - pos;
                    let inside = area.contains(p) && rect(0, 0, 6, 5).contains(local);
                    let expected = if inside && win.at(local) != KEY { win.at(local) } else { GRAY };
                    prop_assert_eq!(dst.pixel_at(p), Some(expected));
                }
            }
        }
    }
}
