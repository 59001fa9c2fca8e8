// desktop.rs — 画面の組み立てとイベント処理
//
// レイヤー構成（奥から）:
//   0 背景（デスクトップとタスクバー）
//   1 コンソール
//   2 カウンターウィンドウ（counter-window フィーチャ、ドラッグ可）
//   最前面 マウスカーソル
//
// LayerManager・Console・Mouse はここで 1 つずつ作り、Desktop が持つ。
// グローバル変数にはしない。

use alloc::fmt;
use alloc::format;

use mado_gfx::graphics::{draw_desktop, DESKTOP_BG_COLOR, DESKTOP_FG_COLOR};
use mado_gfx::{
    Console, FrameBufferConfig, LayerManager, Mouse, Rectangle, Result, Vector2D, Window,
};

use crate::framebuffer::{self, SharedFrameBuffer};
use crate::queue::{Message, PointerReport};

/// カーソルの初期位置
pub const INITIAL_MOUSE_POSITION: Vector2D = Vector2D::new(200, 200);

/// Desktop を作る前、画面へ直接描いているコンソールに書く。
pub fn print_early(console: &mut Console, args: fmt::Arguments) {
    if let Err(e) = console.put_string(&fmt::format(args), None) {
        log::warn!("console: early print failed: {}", e);
    }
}

#[cfg(feature = "counter-window")]
mod counter {
    use mado_gfx::font::write_string;
    use mado_gfx::graphics::{fill_rectangle, to_color};
    use mado_gfx::window::draw_window;
    use mado_gfx::{LayerId, LayerManager, PixelFormat, Result, SharedWindow, Vector2D, Window};

    const POSITION: Vector2D = Vector2D::new(300, 100);
    const TEXT_POS: Vector2D = Vector2D::new(24, 28);

    /// 数字が増えていくだけのウィンドウ
    pub struct CounterWindow {
        window: SharedWindow,
        layer: LayerId,
    }

    impl CounterWindow {
        pub fn install(layers: &mut LayerManager, format: PixelFormat) -> Result<Self> {
            let window = Window::new_shared(160, 52, format)?;
            draw_window(&mut *window.lock(), "Hello Window");
            let layer = layers
                .new_layer()
                .set_window(window.clone())
                .set_draggable(true)
                .move_to(POSITION)
                .id();
            layers.up_down(layer, 2)?;
            Ok(Self { window, layer })
        }

        pub fn update(&self, layers: &mut LayerManager, count: u64) -> Result<()> {
            {
                let mut window = self.window.lock();
                fill_rectangle(&mut *window, TEXT_POS, Vector2D::new(8 * 10, 16), to_color(0xc6c6c6));
                let text = alloc::format!("{:010}", count);
                write_string(&mut *window, TEXT_POS, &text, to_color(0x000000), to_color(0xc6c6c6));
            }
            layers.draw_layer(self.layer)
        }
    }
}

pub struct Desktop {
    screen: SharedFrameBuffer,
    layers: LayerManager,
    console: Console,
    mouse: Mouse,
    #[cfg(feature = "counter-window")]
    counter: counter::CounterWindow,
}

impl Desktop {
    /// レイヤーを組み立て、コンソールをウィンドウへ移し、全体を 1 回描く。
    pub fn new(screen: SharedFrameBuffer, mut console: Console, config: FrameBufferConfig) -> Result<Self> {
        let mut layers = LayerManager::new(config)?;
        let size = layers.screen_size();
        let format = layers.format();

        let bg_window = Window::new_shared(size.x, size.y, format)?;
        draw_desktop(&mut *bg_window.lock());
        let bg_layer = layers.new_layer().set_window(bg_window).move_to(Vector2D::ZERO).id();
        layers.up_down(bg_layer, 0)?;

        let console_size = Console::pixel_size();
        let console_window = Window::new_shared(console_size.x, console_size.y, format)?;
        let console_layer = layers
            .new_layer()
            .set_window(console_window.clone())
            .move_to(Vector2D::ZERO)
            .id();
        layers.up_down(console_layer, 1)?;
        console.set_window(console_window, Some(console_layer));

        #[cfg(feature = "counter-window")]
        let counter = counter::CounterWindow::install(&mut layers, format)?;

        let mouse = Mouse::install(&mut layers, INITIAL_MOUSE_POSITION)?;

        let mut desktop = Self {
            screen,
            layers,
            console,
            mouse,
            #[cfg(feature = "counter-window")]
            counter,
        };
        desktop.layers.draw(&Rectangle::new(Vector2D::ZERO, size))?;
        desktop.present()?;
        log::info!("desktop: {}x{} {:?}", size.x, size.y, format);
        Ok(desktop)
    }

    pub fn print(&mut self, args: fmt::Arguments) -> Result<()> {
        self.console.put_string(&format!("{}", args), Some(&mut self.layers))?;
        self.present()
    }

    /// メッセージ 1 つを処理して画面へ反映する。
    pub fn handle(&mut self, msg: Message) -> Result<()> {
        match msg {
            Message::Pointer(PointerReport { buttons, dx, dy }) => {
                self.mouse.on_pointer_event(&mut self.layers, buttons, dx, dy)?;
            }
            Message::Tick(ticks) => self.on_tick(ticks)?,
        }
        self.present()
    }

    /// Tick ごとにカーソルを点滅させる。カウンターウィンドウがあれば数字も進める。
    fn on_tick(&mut self, ticks: u64) -> Result<()> {
        log::debug!("tick {}", ticks);
        self.console.blink_cursor(Some(&mut self.layers))?;
        #[cfg(feature = "counter-window")]
        self.counter.update(&mut self.layers, ticks)?;
        Ok(())
    }

    fn present(&mut self) -> Result<()> {
        framebuffer::present(&self.screen, &mut self.layers)
    }
}

/// 起動直後、レイヤーを作る前の画面。背景を直接描いてコンソールを重ねる。
pub fn draw_boot_screen(screen: &SharedFrameBuffer) -> Console {
    draw_desktop(&mut *screen.lock());
    let writer: mado_gfx::SharedWriter = screen.clone();
    Console::new(
        mado_gfx::ConsoleTarget::Screen(writer),
        DESKTOP_FG_COLOR,
        DESKTOP_BG_COLOR,
    )
}
