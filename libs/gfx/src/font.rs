// font.rs — 文字描画
//
// font8x8 のグリフは 8x8 ピクセル。各バイトが 1 行分で、LSB が左端。
// コンソールの 1 マスは 8x16 なので、各行を縦に 2 回ずつ描いて引き伸ばす。

use font8x8::UnicodeFonts;

use crate::graphics::{PixelColor, PixelWriter, Vector2D};

/// 1 文字の幅（ピクセル）
pub const GLYPH_WIDTH: i32 = 8;
/// 1 文字の高さ（ピクセル）
pub const GLYPH_HEIGHT: i32 = 16;

const SCALE_Y: i32 = GLYPH_HEIGHT / 8;

/// グリフを取得する。未対応文字は '?' で代用。
fn glyph(c: char) -> [u8; 8] {
    font8x8::BASIC_FONTS
        .get(c)
        .or_else(|| font8x8::BASIC_FONTS.get('?'))
        .unwrap_or([0; 8])
}

/// pos を左上として 1 文字描く。ビットが立っていれば fg、それ以外は bg。
pub fn write_ascii<W: PixelWriter + ?Sized>(
    writer: &mut W,
    pos: Vector2D,
    c: char,
    fg: PixelColor,
    bg: PixelColor,
) {
    for (row, &bits) in glyph(c).iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            let color = if (bits >> col) & 1 == 1 { fg } else { bg };
            for sy in 0..SCALE_Y {
                let y = row as i32 * SCALE_Y + sy;
                writer.write(pos + Vector2D::new(col, y), color);
            }
        }
    }
}

/// 文字列を横一列に描く。折り返しはしない。
pub fn write_string<W: PixelWriter + ?Sized>(
    writer: &mut W,
    pos: Vector2D,
    s: &str,
    fg: PixelColor,
    bg: PixelColor,
) {
    for (i, c) in s.chars().enumerate() {
        write_ascii(writer, pos + Vector2D::new(i as i32 * GLYPH_WIDTH, 0), c, fg, bg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    struct Recorder {
        w: i32,
        h: i32,
        cells: Vec<Option<PixelColor>>,
    }

    impl Recorder {
        fn new(w: i32, h: i32) -> Self {
            Self { w, h, cells: vec![None; (w * h) as usize] }
        }

        fn at(&self, x: i32, y: i32) -> Option<PixelColor> {
            self.cells[(y * self.w + x) as usize]
        }
    }

    impl PixelWriter for Recorder {
        fn write(&mut self, pos: Vector2D, c: PixelColor) {
            self.cells[(pos.y * self.w + pos.x) as usize] = Some(c);
        }
        fn width(&self) -> i32 {
            self.w
        }
        fn height(&self) -> i32 {
            self.h
        }
    }

    const FG: PixelColor = PixelColor::new(255, 255, 255);
    const BG: PixelColor = PixelColor::new(0, 0, 0);

    #[test]
    fn test_write_ascii_fills_whole_cell() {
        let mut rec = Recorder::new(8, 16);
        write_ascii(&mut rec, Vector2D::ZERO, 'A', FG, BG);
        assert!(rec.cells.iter().all(|c| c.is_some()));
        assert!(rec.cells.iter().any(|c| *c == Some(FG)));
    }

    #[test]
    fn test_write_ascii_doubles_rows() {
        let mut rec = Recorder::new(8, 16);
        write_ascii(&mut rec, Vector2D::ZERO, 'H', FG, BG);
        for row in 0..8 {
            for col in 0..8 {
                assert_eq!(rec.at(col, row * 2), rec.at(col, row * 2 + 1));
            }
        }
    }

    #[test]
    fn test_space_is_background_only() {
        let mut rec = Recorder::new(8, 16);
        write_ascii(&mut rec, Vector2D::ZERO, ' ', FG, BG);
        assert!(rec.cells.iter().all(|c| *c == Some(BG)));
    }

    #[test]
    fn test_write_string_advances_by_glyph_width() {
        let mut rec = Recorder::new(24, 16);
        write_string(&mut rec, Vector2D::ZERO, "ab", FG, BG);
        assert!(rec.at(15, 15).is_some());
        assert!(rec.at(16, 0).is_none());
    }
}
