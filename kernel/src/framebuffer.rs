// framebuffer.rs — GOP フレームバッファ
//
// ExitBootServices の前に GOP から解像度・ストライド・ピクセル形式・物理アドレスを
// 控えておき、後で mado_gfx::FrameBuffer として借用する。
// フレームバッファのメモリはファームウェアのもので、カーネルが止まるまで有効。
//
// 描画はすべて LayerManager のバックバッファで行い、present() で
// 変更のあった矩形だけを実画面へコピーする。

use alloc::sync::Arc;
use spin::Mutex;
use uefi::proto::console::gop::GraphicsOutput;

use mado_gfx::{FrameBuffer, FrameBufferConfig, LayerManager, PixelFormat, Result};

/// 実画面。コンソールの直接描画先としても共有する。
pub type SharedFrameBuffer = Arc<Mutex<FrameBuffer>>;

/// GOP から控えた情報
#[derive(Debug, Clone, Copy)]
pub struct FramebufferInfo {
    pub fb_addr: u64,
    pub fb_size: usize,
    pub config: FrameBufferConfig,
}

impl FramebufferInfo {
    /// ExitBootServices の前に呼ぶこと。
    /// RGB/BGR 以外（ビットマスク、Blt のみ）は UnsupportedFormat。
    pub fn from_gop(gop: &mut GraphicsOutput) -> Result<Self> {
        let mode_info = gop.current_mode_info();
        let (width, height) = mode_info.resolution();
        let format = PixelFormat::from_raw(mode_info.pixel_format() as u32)?;
        let mut fb = gop.frame_buffer();
        Ok(Self {
            fb_addr: fb.as_mut_ptr() as u64,
            fb_size: fb.size(),
            config: FrameBufferConfig {
                width,
                height,
                stride: mode_info.stride(),
                format,
            },
        })
    }

    /// 控えておいたメモリを借用した FrameBuffer を作る。
    pub fn into_frame_buffer(self) -> Result<SharedFrameBuffer> {
        // fb_addr は GOP が返した実フレームバッファで、fb_size バイト有効。
        let fb = unsafe { FrameBuffer::from_raw(self.config, self.fb_addr as *mut u8, self.fb_size)? };
        Ok(Arc::new(Mutex::new(fb)))
    }

    /// バックバッファ用。ストライドは幅に詰める。
    pub fn screen_config(&self) -> FrameBufferConfig {
        FrameBufferConfig::new(self.config.width, self.config.height, self.config.format)
    }
}

/// LayerManager が描いた範囲を実画面へ反映する。
pub fn present(screen: &SharedFrameBuffer, layers: &mut LayerManager) -> Result<()> {
    let Some(area) = layers.take_dirty() else {
        return Ok(());
    };
    screen.lock().copy(area.pos, layers.buffer(), Some(area))
}
