// frame_buffer.rs — 線形ピクセルメモリとブロック転送
//
// FrameBuffer は「解像度・ストライド・ピクセルフォーマットが決まった
// 連続メモリ」を表す。メモリは 2 通り:
//
//   - 自前で確保した Vec<u8>（ウィンドウのシャドウバッファや合成用バッファ）
//   - ブートローダーから受け取った物理フレームバッファ（生ポインタで借用）
//
// 借用の場合、操作のたびにその場限りのスライスを作る。
// 同じ物理メモリを指す FrameBuffer が複数あっても、同時に操作しなければ問題ない。

use alloc::vec::Vec;
use core::ptr::NonNull;

use crate::error::{Error, ErrorCode, Result};
use crate::graphics::{MovePlan, PixelColor, PixelFormat, PixelWriter, Rectangle, Vector2D};

/// フレームバッファの形式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameBufferConfig {
    /// 横方向のピクセル数
    pub width: usize,
    /// 縦方向のピクセル数
    pub height: usize,
    /// 1 行あたりのピクセル数。GPU のアラインメントで width より大きいことがある。
    pub stride: usize,
    pub format: PixelFormat,
}

impl FrameBufferConfig {
    /// stride = width の詰まった形式。
    pub const fn new(width: usize, height: usize, format: PixelFormat) -> Self {
        Self { width, height, stride: width, format }
    }

    /// 必要なバイト数（stride * height * bytes_per_pixel）。
    ///
    /// usize に収まらない、または幅・高さが座標（i32）で表せない大きさなら None。
    /// 掛け算をそのまま書くと debug ビルドでは panic、release ビルドでは
    /// 桁あふれした小さな値になり、足りないバッファを確保してしまう。
    pub fn byte_len(&self) -> Option<usize> {
        if self.width > i32::MAX as usize || self.height > i32::MAX as usize {
            return None;
        }
        self.stride
            .checked_mul(self.height)?
            .checked_mul(self.format.bytes_per_pixel())
    }
}

enum Memory {
    Owned(Vec<u8>),
    Borrowed { ptr: NonNull<u8>, len: usize },
}

impl Memory {
    fn as_slice(&self) -> &[u8] {
        match self {
            Memory::Owned(buf) => buf.as_slice(),
            // SAFETY: from_raw の呼び出し元が ptr..ptr+len の有効性を保証している
            Memory::Borrowed { ptr, len } => unsafe {
                core::slice::from_raw_parts(ptr.as_ptr(), *len)
            },
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Memory::Owned(buf) => buf.as_mut_slice(),
            Memory::Borrowed { ptr, len } => unsafe {
                core::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
        }
    }
}

/// ゼロ初期化したバッファを確保する。確保できなければ AllocationFailed。
pub(crate) fn try_alloc_zeroed<T: Clone + Default>(len: usize) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::new(ErrorCode::AllocationFailed))?;
    buf.resize(len, T::default());
    Ok(buf)
}

pub struct FrameBuffer {
    config: FrameBufferConfig,
    memory: Memory,
}

// 借用メモリは生ポインタなので自動では Send にならない。
// カーネルでは単一コンテキストからしか触らない。
// 実画面の FrameBuffer は Arc<Mutex<..>> に入れて共有するので、
// Mutex 越しに別の場所から触るには Send が要る。
unsafe impl Send for FrameBuffer {}

impl FrameBuffer {
    /// メモリを自前で確保して FrameBuffer を作る。
    pub fn new(config: FrameBufferConfig) -> Result<Self> {
        let config = normalize(config);
        let len = config
            .byte_len()
            .ok_or_else(|| Error::new(ErrorCode::AllocationFailed))?;
        let buf = try_alloc_zeroed::<u8>(len)?;
        log::debug!(
            "frame buffer allocated: {}x{} {:?}",
            config.width,
            config.height,
            config.format
        );
        Ok(Self { config, memory: Memory::Owned(buf) })
    }

    /// 既存のピクセルメモリ（ブートローダーの物理フレームバッファなど）を借りて作る。
    ///
    /// # Safety
    /// `ptr` から `len` バイトが、返した FrameBuffer が生きている間ずっと
    /// 読み書き可能でなければならない。
    pub unsafe fn from_raw(config: FrameBufferConfig, ptr: *mut u8, len: usize) -> Result<Self> {
        let config = normalize(config);
        // 大きさが計算できない構成は、どんな領域でも足りないものとして扱う
        match config.byte_len() {
            Some(needed) if needed <= len => {}
            _ => return Err(Error::new(ErrorCode::BufferTooSmall)),
        }
        let ptr = NonNull::new(ptr).ok_or_else(|| Error::new(ErrorCode::BufferTooSmall))?;
        Ok(Self { config, memory: Memory::Borrowed { ptr, len } })
    }

    pub fn config(&self) -> &FrameBufferConfig {
        &self.config
    }

    pub fn format(&self) -> PixelFormat {
        self.config.format
    }

    pub fn size(&self) -> Vector2D {
        Vector2D::new(self.config.width as i32, self.config.height as i32)
    }

    /// pos のピクセルの色を読む。範囲外なら None。
    pub fn pixel_at(&self, pos: Vector2D) -> Option<PixelColor> {
        if !self.bounds().contains(pos) {
            return None;
        }
        let off = self.offset_of(pos);
        let bpp = self.config.format.bytes_per_pixel();
        Some(self.config.format.decode(&self.memory.as_slice()[off..off + bpp]))
    }

    /// 別の FrameBuffer の src_area（省略時は全体）を dst_pos へコピーする。
    ///
    /// 両方のバッファからはみ出す部分は黙って切り落とす。結果が空なら何もしない。
    /// ピクセルフォーマットが違う場合は変換せず FormatMismatch を返す。
    pub fn copy(&mut self, dst_pos: Vector2D, src: &FrameBuffer, src_area: Option<Rectangle>) -> Result<()> {
        if self.config.format != src.config.format {
            return Err(Error::new(ErrorCode::FormatMismatch));
        }

        let src_area = src_area.unwrap_or_else(|| src.bounds());
        // 転送元座標 + offset = 転送先座標
        //
        // 切り落としは転送先の座標系でまとめて行う:
        //   self.bounds()  … 転送先のバッファ全体
        //   src_outline    … 転送元バッファ全体を転送先の座標に置いたもの
        //   area_shifted   … 指定された src_area を転送先の座標に置いたもの
        // この 3 つの交差が実際に書き換える範囲になる。
        let offset = dst_pos - src_area.pos;
        let src_outline = Rectangle::new(offset, src.size());
        let area_shifted = Rectangle::new(dst_pos, src_area.size);
        let copy_area = self.bounds() & src_outline & area_shifted;
        if copy_area.is_empty() {
            return Ok(());
        }

        let src_start = copy_area.pos - offset;
        let bpp = self.config.format.bytes_per_pixel();
        let row_bytes = copy_area.size.x as usize * bpp;
        let dst_stride = self.config.stride;
        let src_stride = src.config.stride;
        let dst_buf = self.memory.as_mut_slice();
        let src_buf = src.memory.as_slice();

        // 同じフォーマットなので行単位の memcpy で済む。
        // stride は width より大きいことがあるので（GOP の実フレームバッファなど）、
        // 行の先頭はそれぞれのバッファの stride で計算する。行末の余白は触らない。
        for dy in 0..copy_area.size.y {
            let d = byte_offset(dst_stride, bpp, copy_area.pos + Vector2D::new(0, dy));
            let s = byte_offset(src_stride, bpp, src_start + Vector2D::new(0, dy));
            dst_buf[d..d + row_bytes].copy_from_slice(&src_buf[s..s + row_bytes]);
        }
        Ok(())
    }

    /// バッファ内で src の矩形を dst_pos へずらす（スクロール用）。
    ///
    /// 転送元と転送先が重なっていても正しく動く。上へずらすときは上の行から、
    /// 下へずらすときは下の行から処理し、行内は copy_within（memmove 相当）で動かす。
    pub fn move_region(&mut self, dst_pos: Vector2D, src: &Rectangle) {
        let Some(plan) = MovePlan::new(self.size(), dst_pos, src) else {
            return;
        };
        let bpp = self.config.format.bytes_per_pixel();
        let stride = self.config.stride;
        let row_bytes = plan.src.size.x as usize * bpp;
        let buf = self.memory.as_mut_slice();

        // 行の順番は MovePlan::rows が決める（行同士の上書きを避ける）。
        // 同じ行の中の重なりは copy_within が処理する。
        for (src_y, dst_y) in plan.rows() {
            let s = byte_offset(stride, bpp, Vector2D::new(plan.src.pos.x, src_y));
            let d = byte_offset(stride, bpp, Vector2D::new(plan.dst.x, dst_y));
            buf.copy_within(s..s + row_bytes, d);
        }
    }

    fn bounds(&self) -> Rectangle {
        Rectangle::new(Vector2D::ZERO, self.size())
    }

    fn offset_of(&self, pos: Vector2D) -> usize {
        byte_offset(self.config.stride, self.config.format.bytes_per_pixel(), pos)
    }
}

impl PixelWriter for FrameBuffer {
    /// 範囲外への書き込みは無視する。
    fn write(&mut self, pos: Vector2D, c: PixelColor) {
        if !self.bounds().contains(pos) {
            return;
        }
        let off = self.offset_of(pos);
        let pixel = self.config.format.encode(c);
        self.memory.as_mut_slice()[off..off + pixel.len()].copy_from_slice(&pixel);
    }

    fn width(&self) -> i32 {
        self.config.width as i32
    }

    fn height(&self) -> i32 {
        self.config.height as i32
    }
}

/// pos のピクセルの先頭バイト位置。pos は範囲内であること（呼び出し側で確認済み）。
fn byte_offset(stride: usize, bpp: usize, pos: Vector2D) -> usize {
    (pos.y as usize * stride + pos.x as usize) * bpp
}

/// stride が未設定（0）や width 未満なら width に揃える。
///
/// stride < width のままだと次の行の先頭と重なり、1 行書くたびに
/// 隣の行を壊してしまう。自前で確保するバッファなら詰めた形が一番無駄が無い。
fn normalize(mut config: FrameBufferConfig) -> FrameBufferConfig {
    if config.stride < config.width {
        config.stride = config.width;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use proptest::prelude::*;

    fn rect(x: i32, y: i32, w: i32, h: i32) -> Rectangle {
        Rectangle::new(Vector2D::new(x, y), Vector2D::new(w, h))
    }

    /// 座標ごとに違う色で埋めた FrameBuffer
    fn patterned(w: usize, h: usize, format: PixelFormat) -> FrameBuffer {
        let mut fb = FrameBuffer::new(FrameBufferConfig::new(w, h, format)).unwrap();
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                fb.write(Vector2D::new(x, y), pattern(x, y));
            }
        }
        fb
    }

    fn pattern(x: i32, y: i32) -> PixelColor {
        PixelColor::new(x as u8, y as u8, (x * 7 + y * 13) as u8)
    }

    #[test]
    fn test_write_and_read_back() {
        for format in [PixelFormat::Rgb, PixelFormat::Bgr] {
            let mut fb = FrameBuffer::new(FrameBufferConfig::new(4, 3, format)).unwrap();
            let c = PixelColor::new(10, 20, 30);
            fb.write(Vector2D::new(3, 2), c);
            assert_eq!(fb.pixel_at(Vector2D::new(3, 2)), Some(c));
            assert_eq!(fb.pixel_at(Vector2D::new(4, 2)), None);
        }
    }

    #[test]
    fn test_out_of_range_write_is_ignored() {
        let mut fb = FrameBuffer::new(FrameBufferConfig::new(2, 2, PixelFormat::Rgb)).unwrap();
        fb.write(Vector2D::new(-1, 0), PixelColor::new(1, 1, 1));
        fb.write(Vector2D::new(2, 0), PixelColor::new(1, 1, 1));
        assert_eq!(fb.pixel_at(Vector2D::ZERO), Some(PixelColor::default()));
    }

    #[test]
    fn test_from_raw_respects_stride() {
        let mut mem = vec![0u8; 6 * 2 * 4];
        let config = FrameBufferConfig { width: 4, height: 2, stride: 6, format: PixelFormat::Bgr };
        let mut fb = unsafe { FrameBuffer::from_raw(config, mem.as_mut_ptr(), mem.len()) }.unwrap();
        fb.write(Vector2D::new(1, 1), PixelColor::new(0xaa, 0xbb, 0xcc));
        drop(fb);
        let off = (6 + 1) * 4;
        assert_eq!(&mem[off..off + 4], &[0xcc, 0xbb, 0xaa, 0]);
    }

    #[test]
    fn test_from_raw_too_small() {
        let mut mem = vec![0u8; 10];
        let config = FrameBufferConfig::new(4, 4, PixelFormat::Rgb);
        let result = unsafe { FrameBuffer::from_raw(config, mem.as_mut_ptr(), mem.len()) };
        assert_eq!(result.err().map(|e| e.code()), Some(ErrorCode::BufferTooSmall));
    }

    #[test]
    fn test_new_too_large_is_allocation_failed() {
        // stride * height * 4 が usize を超える
        let overflow = FrameBufferConfig::new(usize::MAX / 2, 4, PixelFormat::Rgb);
        let result = FrameBuffer::new(overflow);
        assert_eq!(result.err().map(|e| e.code()), Some(ErrorCode::AllocationFailed));

        // 計算はできるが確保できない大きさ
        let huge = FrameBufferConfig::new(1 << 30, 1 << 30, PixelFormat::Bgr);
        let result = FrameBuffer::new(huge);
        assert_eq!(result.err().map(|e| e.code()), Some(ErrorCode::AllocationFailed));
    }

    #[test]
    fn test_byte_len_overflow_is_none() {
        assert_eq!(FrameBufferConfig::new(4, 3, PixelFormat::Rgb).byte_len(), Some(48));
        assert_eq!(FrameBufferConfig::new(usize::MAX / 2, 4, PixelFormat::Rgb).byte_len(), None);
        assert_eq!(FrameBufferConfig::new(1 << 40, 1, PixelFormat::Rgb).byte_len(), None);
    }

    #[test]
    fn test_from_raw_overflowing_config_is_too_small() {
        let mut mem = vec![0u8; 16];
        let config = FrameBufferConfig::new(usize::MAX / 2, 4, PixelFormat::Bgr);
        let result = unsafe { FrameBuffer::from_raw(config, mem.as_mut_ptr(), mem.len()) };
        assert_eq!(result.err().map(|e| e.code()), Some(ErrorCode::BufferTooSmall));
    }

    #[test]
    fn test_copy_format_mismatch() {
        let mut dst = FrameBuffer::new(FrameBufferConfig::new(4, 4, PixelFormat::Rgb)).unwrap();
        let src = FrameBuffer::new(FrameBufferConfig::new(4, 4, PixelFormat::Bgr)).unwrap();
        let result = dst.copy(Vector2D::ZERO, &src, None);
        assert_eq!(result.err().map(|e| e.code()), Some(ErrorCode::FormatMismatch));
    }

    #[test]
    fn test_copy_clips_off_screen() {
        let src = patterned(4, 4, PixelFormat::Rgb);
        let mut dst = FrameBuffer::new(FrameBufferConfig::new(6, 6, PixelFormat::Rgb)).unwrap();
        dst.copy(Vector2D::new(-2, 4), &src, None).unwrap();
        // src の (2, 0) が dst の (0, 4) に来る
        assert_eq!(dst.pixel_at(Vector2D::new(0, 4)), Some(pattern(2, 0)));
        assert_eq!(dst.pixel_at(Vector2D::new(1, 5)), Some(pattern(3, 1)));
        assert_eq!(dst.pixel_at(Vector2D::new(2, 4)), Some(PixelColor::default()));
    }

    #[test]
    fn test_copy_sub_area() {
        let src = patterned(8, 8, PixelFormat::Bgr);
        let mut dst = FrameBuffer::new(FrameBufferConfig::new(8, 8, PixelFormat::Bgr)).unwrap();
        dst.copy(Vector2D::new(5, 5), &src, Some(rect(5, 5, 2, 2))).unwrap();
        assert_eq!(dst.pixel_at(Vector2D::new(5, 5)), Some(pattern(5, 5)));
        assert_eq!(dst.pixel_at(Vector2D::new(6, 6)), Some(pattern(6, 6)));
        assert_eq!(dst.pixel_at(Vector2D::new(7, 7)), Some(PixelColor::default()));
        assert_eq!(dst.pixel_at(Vector2D::new(4, 5)), Some(PixelColor::default()));
    }

    #[test]
    fn test_copy_empty_area_is_noop() {
        let src = patterned(4, 4, PixelFormat::Rgb);
        let mut dst = FrameBuffer::new(FrameBufferConfig::new(4, 4, PixelFormat::Rgb)).unwrap();
        dst.copy(Vector2D::new(100, 100), &src, None).unwrap();
        dst.copy(Vector2D::ZERO, &src, Some(rect(0, 0, 0, 3))).unwrap();
        assert_eq!(dst.pixel_at(Vector2D::ZERO), Some(PixelColor::default()));
    }

    #[test]
    fn test_move_region_scroll_up() {
        let mut fb = patterned(4, 4, PixelFormat::Rgb);
        fb.move_region(Vector2D::ZERO, &rect(0, 1, 4, 3));
        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(fb.pixel_at(Vector2D::new(x, y)), Some(pattern(x, y + 1)));
            }
        }
        // 最下行はそのまま残る
        assert_eq!(fb.pixel_at(Vector2D::new(0, 3)), Some(pattern(0, 3)));
    }

    /// 独立したスクラッチバッファ経由で動かした場合の期待値
    fn move_via_scratch(fb: &FrameBuffer, dst_pos: Vector2D, src: &Rectangle) -> FrameBuffer {
        let size = fb.size();
        let mut expected = FrameBuffer::new(*fb.config()).unwrap();
        expected.copy(Vector2D::ZERO, fb, None).unwrap();
        let mut scratch = FrameBuffer::new(*fb.config()).unwrap();
        scratch.copy(Vector2D::ZERO, fb, None).unwrap();
        let clipped_src = *src & Rectangle::new(Vector2D::ZERO, size);
        let shift = dst_pos - src.pos;
        expected.copy(clipped_src.pos + shift, &scratch, Some(clipped_src)).unwrap();
        expected
    }

    fn assert_same_pixels(a: &FrameBuffer, b: &FrameBuffer) {
        let size = a.size();
        for y in 0..size.y {
            for x in 0..size.x {
                let p = Vector2D::new(x, y);
                assert_eq!(a.pixel_at(p), b.pixel_at(p), "pixel ({}, {})", x, y);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            max_global_rejects: 65536,
            ..ProptestConfig::default()
        })]

        #[test]
        fn prop_copy_reads_back_source(
            w in 1i32..12, h in 1i32..12,
            x in 0i32..12, y in 0i32..12,
            sx in 0i32..12, sy in 0i32..12,
        ) {
            // 転送元・転送先の両方に完全に収まる矩形だけを試す
            prop_assume!(x + w <= 12 && y + h <= 12 && sx + w <= 12 && sy + h <= 12);
            let src = patterned(12, 12, PixelFormat::Bgr);
            let mut dst = FrameBuffer::new(FrameBufferConfig::new(12, 12, PixelFormat::Bgr)).unwrap();
            dst.copy(Vector2D::new(x, y), &src, Some(rect(sx, sy, w, h))).unwrap();
            for dy in 0..h {
                for dx in 0..w {
                    prop_assert_eq!(
                        dst.pixel_at(Vector2D::new(x + dx, y + dy)),
                        Some(pattern(sx + dx, sy + dy))
                    );
                }
            }
        }

        #[test]
        fn prop_move_matches_scratch_copy(
            sx in -3i32..10, sy in -3i32..10,
            w in 0i32..10, h in 0i32..10,
            dx in -4i32..4, dy in -4i32..4,
        ) {
            let fb = patterned(10, 8, PixelFormat::Rgb);
            let src = rect(sx, sy, w, h);
            let dst_pos = Vector2D::new(sx + dx, sy + dy);
            let expected = move_via_scratch(&fb, dst_pos, &src);
            let mut moved = patterned(10, 8, PixelFormat::Rgb);
            moved.move_region(dst_pos, &src);
            assert_same_pixels(&moved, &expected);
        }
    }
}
