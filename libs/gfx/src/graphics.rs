// graphics.rs — 色・座標・矩形と PixelWriter
//
// ファームウェアが報告するピクセル配置は RGB と BGR の 2 種類ある。
// どちらで書くかは起動時に決まるので、描画ルーチンは PixelWriter トレイト越しに
// 1 ピクセルずつ書く（dyn で実行時ディスパッチ）。

use core::ops::{Add, AddAssign, BitAnd, Sub};

use crate::error::{Error, ErrorCode, Result};

/// 1 ピクセルの色。各チャネル 8 bit、アルファなし。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl PixelColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// 0xRRGGBB 形式の数値を PixelColor に変換する。
pub const fn to_color(c: u32) -> PixelColor {
    PixelColor {
        r: ((c >> 16) & 0xff) as u8,
        g: ((c >> 8) & 0xff) as u8,
        b: (c & 0xff) as u8,
    }
}

pub const DESKTOP_BG_COLOR: PixelColor = PixelColor::new(45, 118, 237);
pub const DESKTOP_FG_COLOR: PixelColor = PixelColor::new(255, 255, 255);

/// 2 次元の座標・サイズ・変位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Vector2D {
    pub x: i32,
    pub y: i32,
}

impl Vector2D {
    pub const ZERO: Vector2D = Vector2D { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Add for Vector2D {
    type Output = Vector2D;

    fn add(self, rhs: Vector2D) -> Vector2D {
        Vector2D::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vector2D {
    fn add_assign(&mut self, rhs: Vector2D) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vector2D {
    type Output = Vector2D;

    fn sub(self, rhs: Vector2D) -> Vector2D {
        Vector2D::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// 左上 pos、大きさ size の矩形。右端・下端は exclusive。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rectangle {
    pub pos: Vector2D,
    pub size: Vector2D,
}

impl Rectangle {
    pub const fn new(pos: Vector2D, size: Vector2D) -> Self {
        Self { pos, size }
    }

    /// 右下の角（exclusive）
    pub fn end(&self) -> Vector2D {
        self.pos + self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size.x <= 0 || self.size.y <= 0
    }

    pub fn contains(&self, p: Vector2D) -> bool {
        let end = self.end();
        p.x >= self.pos.x && p.x < end.x && p.y >= self.pos.y && p.y < end.y
    }

    /// 2 つの矩形の共通部分。重ならなければ大きさ 0 の矩形を返す（エラーにはしない）。
    pub fn intersect(&self, other: &Rectangle) -> Rectangle {
        let x0 = self.pos.x.max(other.pos.x);
        let y0 = self.pos.y.max(other.pos.y);
        let x1 = self.end().x.min(other.end().x);
        let y1 = self.end().y.min(other.end().y);
        if x1 <= x0 || y1 <= y0 {
            return Rectangle::default();
        }
        Rectangle::new(Vector2D::new(x0, y0), Vector2D::new(x1 - x0, y1 - y0))
    }

    /// 両方を含む最小の矩形。空の矩形は無視する。
    pub fn union(&self, other: &Rectangle) -> Rectangle {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.pos.x.min(other.pos.x);
        let y0 = self.pos.y.min(other.pos.y);
        let x1 = self.end().x.max(other.end().x);
        let y1 = self.end().y.max(other.end().y);
        Rectangle::new(Vector2D::new(x0, y0), Vector2D::new(x1 - x0, y1 - y0))
    }
}

impl BitAnd for Rectangle {
    type Output = Rectangle;

    fn bitand(self, rhs: Rectangle) -> Rectangle {
        self.intersect(&rhs)
    }
}

/// ピクセルのバイト配置。どちらも 1 ピクセル 4 バイト（最後の 1 バイトは予約）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// [R, G, B, 予約]
    Rgb,
    /// [B, G, R, 予約]
    Bgr,
}

impl PixelFormat {
    /// ファームウェア (GOP) のピクセルフォーマット番号から変換する。
    /// 0 = RGB, 1 = BGR。ビットマスク形式や Blt 専用は描画できないので弾く。
    pub fn from_raw(raw: u32) -> Result<Self> {
        match raw {
            0 => Ok(PixelFormat::Rgb),
            1 => Ok(PixelFormat::Bgr),
            _ => Err(Error::new(ErrorCode::UnsupportedFormat)),
        }
    }

    pub const fn bytes_per_pixel(self) -> usize {
        4
    }

    #[inline(always)]
    pub fn encode(self, c: PixelColor) -> [u8; 4] {
        match self {
            PixelFormat::Rgb => [c.r, c.g, c.b, 0],
            PixelFormat::Bgr => [c.b, c.g, c.r, 0],
        }
    }

    #[inline(always)]
    pub fn decode(self, p: &[u8]) -> PixelColor {
        match self {
            PixelFormat::Rgb => PixelColor::new(p[0], p[1], p[2]),
            PixelFormat::Bgr => PixelColor::new(p[2], p[1], p[0]),
        }
    }
}

/// 「(x, y) に色 c を書く」能力。
///
/// 生のフレームバッファ、ウィンドウ、テスト用の記録器などが実装する。
/// コンソールや図形ルーチンは書き込み先の種類を知らずに済む。
pub trait PixelWriter {
    fn write(&mut self, pos: Vector2D, c: PixelColor);
    fn width(&self) -> i32;
    fn height(&self) -> i32;
}

pub fn fill_rectangle<W: PixelWriter + ?Sized>(
    writer: &mut W,
    pos: Vector2D,
    size: Vector2D,
    c: PixelColor,
) {
    for dy in 0..size.y {
        for dx in 0..size.x {
            writer.write(pos + Vector2D::new(dx, dy), c);
        }
    }
}

/// 矩形の枠線だけを描く。
pub fn draw_rectangle<W: PixelWriter + ?Sized>(
    writer: &mut W,
    pos: Vector2D,
    size: Vector2D,
    c: PixelColor,
) {
    if size.x <= 0 || size.y <= 0 {
        return;
    }
    for dx in 0..size.x {
        writer.write(pos + Vector2D::new(dx, 0), c);
        writer.write(pos + Vector2D::new(dx, size.y - 1), c);
    }
    for dy in 0..size.y {
        writer.write(pos + Vector2D::new(0, dy), c);
        writer.write(pos + Vector2D::new(size.x - 1, dy), c);
    }
}

/// デスクトップ背景を描く（背景色 + 下端のタスクバー + スタートボタン）。
pub fn draw_desktop<W: PixelWriter + ?Sized>(writer: &mut W) {
    let width = writer.width();
    let height = writer.height();
    let taskbar_h = 50.min(height);

    fill_rectangle(
        writer,
        Vector2D::ZERO,
        Vector2D::new(width, height - taskbar_h),
        DESKTOP_BG_COLOR,
    );
    fill_rectangle(
        writer,
        Vector2D::new(0, height - taskbar_h),
        Vector2D::new(width, taskbar_h),
        PixelColor::new(1, 8, 17),
    );
    fill_rectangle(
        writer,
        Vector2D::new(0, height - taskbar_h),
        Vector2D::new(width / 5, taskbar_h),
        PixelColor::new(80, 80, 80),
    );
    draw_rectangle(
        writer,
        Vector2D::new(10, height - 40),
        Vector2D::new(30, 30),
        PixelColor::new(160, 160, 160),
    );
}

/// 同一バッファ内で src を dst_pos へずらすときの転送計画。
///
/// はみ出す部分を切り落とした転送元矩形と、行をどの順で処理すれば
/// 読む前に上書きしないかを持つ。FrameBuffer と Window の両方が使う。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MovePlan {
    pub src: Rectangle,
    pub dst: Vector2D,
}

impl MovePlan {
    /// 大きさ size の領域の中で src を dst_pos へ移す計画を立てる。
    /// 転送するものが無ければ None。
    pub fn new(size: Vector2D, dst_pos: Vector2D, src: &Rectangle) -> Option<Self> {
        let bounds = Rectangle::new(Vector2D::ZERO, size);
        let shift = dst_pos - src.pos;
        // 転送先が領域内に収まる転送元ピクセルだけを残す。
        // 「転送先の領域」を転送元の座標系に戻したもの（bounds を -shift だけずらした矩形）と
        // 交差を取れば、転送元・転送先の両方で範囲内の部分だけが残る。
        let dst_bounds_in_src = Rectangle::new(bounds.pos - shift, bounds.size);
        let clipped = *src & bounds & dst_bounds_in_src;
        if clipped.is_empty() {
            return None;
        }
        Some(Self {
            src: clipped,
            dst: clipped.pos + shift,
        })
    }

    /// (転送元の行, 転送先の行) を安全な順に返す。
    /// 上へ動かすときは上の行から、下へ動かすときは下の行から処理する。
    ///
    /// 例えば 1 行上へスクロールする場合（src の y=1..h を y=0.. へ）:
    ///   行 1 → 行 0, 行 2 → 行 1, ...
    /// 上から順なら、上書きされる行 0 はもう読み終わっている（そもそも src 外）。
    /// 逆に下から順にすると、行 2 → 行 1 で行 1 を潰してから行 1 を読むことになる。
    /// 下へ動かすときは鏡写しで、下の行から処理すれば同じ理屈で安全。
    ///
    /// 同じ行の中で左右にずらす場合（dst.y == src.y）の重なりは、
    /// 呼び出し側の copy_within（memmove 相当）が面倒を見る。
    pub fn rows(&self) -> impl Iterator<Item = (i32, i32)> {
        let h = self.src.size.y;
        let upward = self.dst.y <= self.src.pos.y;
        let src_y = self.src.pos.y;
        let dst_y = self.dst.y;
        (0..h).map(move |i| {
            let dy = if upward { i } else { h - 1 - i };
            (src_y + dy, dst_y + dy)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle {
        Rectangle::new(Vector2D::new(x, y), Vector2D::new(w, h))
    }

    #[test]
    fn test_to_color() {
        assert_eq!(to_color(0x2d76ed), PixelColor::new(45, 118, 237));
        assert_eq!(to_color(0), PixelColor::default());
    }

    #[test]
    fn test_intersect_overlapping() {
        assert_eq!(rect(0, 0, 10, 10) & rect(5, 5, 10, 10), rect(5, 5, 5, 5));
        assert_eq!(rect(2, 3, 4, 5) & rect(0, 0, 100, 100), rect(2, 3, 4, 5));
    }

    #[test]
    fn test_intersect_disjoint_is_empty() {
        assert_eq!(rect(0, 0, 10, 10) & rect(20, 20, 5, 5), Rectangle::default());
        // 辺が接しているだけなら重なりなし
        assert_eq!(rect(0, 0, 10, 10) & rect(10, 0, 5, 5), Rectangle::default());
        // 大きさが負の矩形は空として扱う
        assert!((rect(5, 5, -3, 4) & rect(0, 0, 10, 10)).is_empty());
    }

    #[test]
    fn test_union_ignores_empty() {
        assert_eq!(rect(0, 0, 2, 2).union(&rect(5, 5, 1, 1)), rect(0, 0, 6, 6));
        assert_eq!(Rectangle::default().union(&rect(3, 4, 1, 1)), rect(3, 4, 1, 1));
        assert_eq!(rect(3, 4, 1, 1).union(&Rectangle::default()), rect(3, 4, 1, 1));
    }

    #[test]
    fn test_contains_is_half_open() {
        let r = rect(10, 20, 5, 5);
        assert!(r.contains(Vector2D::new(10, 20)));
        assert!(r.contains(Vector2D::new(14, 24)));
        assert!(!r.contains(Vector2D::new(15, 24)));
        assert!(!r.contains(Vector2D::new(14, 25)));
    }

    #[test]
    fn test_pixel_format_channel_order() {
        let c = PixelColor::new(1, 2, 3);
        assert_eq!(PixelFormat::Rgb.encode(c), [1, 2, 3, 0]);
        assert_eq!(PixelFormat::Bgr.encode(c), [3, 2, 1, 0]);
        assert_eq!(PixelFormat::Bgr.decode(&PixelFormat::Bgr.encode(c)), c);
    }

    #[test]
    fn test_pixel_format_from_raw() {
        assert_eq!(PixelFormat::from_raw(0).ok(), Some(PixelFormat::Rgb));
        assert_eq!(PixelFormat::from_raw(1).ok(), Some(PixelFormat::Bgr));
        assert_eq!(
            PixelFormat::from_raw(2).err().map(|e| e.code()),
            Some(ErrorCode::UnsupportedFormat)
        );
    }

    #[test]
    fn test_move_plan_clips_to_bounds() {
        let plan = MovePlan::new(Vector2D::new(10, 10), Vector2D::new(-2, 0), &rect(0, 0, 5, 5)).unwrap();
        assert_eq!(plan.src, rect(2, 0, 3, 5));
        assert_eq!(plan.dst, Vector2D::new(0, 0));

        assert!(MovePlan::new(Vector2D::new(10, 10), Vector2D::new(20, 0), &rect(0, 0, 5, 5)).is_none());
    }

    #[test]
    fn test_move_plan_row_order() {
        let up = MovePlan::new(Vector2D::new(4, 4), Vector2D::new(0, 0), &rect(0, 1, 4, 3)).unwrap();
        let rows: Vec<_> = up.rows().collect();
        assert_eq!(rows, vec![(1, 0), (2, 1), (3, 2)]);

        let down = MovePlan::new(Vector2D::new(4, 4), Vector2D::new(0, 1), &rect(0, 0, 4, 3)).unwrap();
        let rows: Vec<_> = down.rows().collect();
        assert_eq!(rows, vec![(2, 3), (1, 2), (0, 1)]);
    }

    struct Grid {
        w: i32,
        h: i32,
        cells: Vec<PixelColor>,
    }

    impl PixelWriter for Grid {
        fn write(&mut self, pos: Vector2D, c: PixelColor) {
            self.cells[(pos.y * self.w + pos.x) as usize] = c;
        }
        fn width(&self) -> i32 {
            self.w
        }
        fn height(&self) -> i32 {
            self.h
        }
    }

    #[test]
    fn test_draw_rectangle_outline_only() {
        let mut g = Grid { w: 5, h: 5, cells: vec![PixelColor::default(); 25] };
        let red = PixelColor::new(255, 0, 0);
        draw_rectangle(&mut g, Vector2D::new(1, 1), Vector2D::new(3, 3), red);
        assert_eq!(g.cells[6], red);
        assert_eq!(g.cells[18], red);
        // 中心は塗らない
        assert_eq!(g.cells[12], PixelColor::default());
    }

    #[test]
    fn test_draw_desktop_layout() {
        let mut g = Grid { w: 100, h: 80, cells: vec![PixelColor::default(); 8000] };
        draw_desktop(&mut g);
        assert_eq!(g.cells[0], DESKTOP_BG_COLOR);
        // タスクバーの右側
        assert_eq!(g.cells[(79 * 100 + 99) as usize], PixelColor::new(1, 8, 17));
        // スタートボタン領域
        assert_eq!(g.cells[(79 * 100) as usize], PixelColor::new(80, 80, 80));
    }
}
