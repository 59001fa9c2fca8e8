// console.rs — 文字コンソール
//
// ROWS x COLUMNS の文字グリッドを持ち、カーソル位置に 1 文字ずつ描いていく。
// 描画先は画面の PixelWriter を直接使う場合と、Window（レイヤー）に描く場合がある。
//
// 最終行で改行したときのスクロールは描画先で方法が変わる:
//   - Window: 描画済みのピクセルを 1 行分上へずらし、最下行だけ塗りつぶす。
//   - 画面直描き: 退避先が無いので領域を塗り直し、グリッドから全行を描き直す。
// どちらの場合も文字グリッド自体は 1 行ずらす。
//
// カーソルは次に文字を書くマスを前景色で塗りつぶしたブロック。
// タイマーから blink_cursor を呼ぶと表示・非表示が切り替わる。
// put_string の間はいったん消し、書き終わったら新しい位置に描き直す。

use alloc::sync::Arc;
use spin::Mutex;

use crate::error::Result;
use crate::font::{write_ascii, GLYPH_HEIGHT, GLYPH_WIDTH};
use crate::graphics::{fill_rectangle, PixelColor, PixelWriter, Rectangle, Vector2D};
use crate::layer::{LayerId, LayerManager};
use crate::window::{SharedWindow, Window};

/// 画面など、ウィンドウ以外の共有描画先
pub type SharedWriter = Arc<Mutex<dyn PixelWriter + Send>>;

/// コンソールの描画先
#[derive(Clone)]
pub enum ConsoleTarget {
    /// PixelWriter へ直接描く
    Screen(SharedWriter),
    /// ウィンドウへ描く。layer があれば put_string の後にそのレイヤーを再描画する。
    Window {
        window: SharedWindow,
        layer: Option<LayerId>,
    },
}

/// ロック済みの描画先
enum Surface<'a> {
    Screen(&'a mut dyn PixelWriter),
    Window(&'a mut Window),
}

impl Surface<'_> {
    fn writer(&mut self) -> &mut dyn PixelWriter {
        match self {
            Surface::Screen(w) => &mut **w,
            Surface::Window(w) => &mut **w,
        }
    }
}

pub struct Console {
    /// 0 は空きマス
    buffer: [[u8; Console::COLUMNS]; Console::ROWS],
    cursor_row: usize,
    cursor_column: usize,
    fg: PixelColor,
    bg: PixelColor,
    target: ConsoleTarget,
    cursor_visible: bool,
}

impl Console {
    pub const ROWS: usize = 25;
    pub const COLUMNS: usize = 80;

    /// 描画先をクリアした状態で作る。
    pub fn new(target: ConsoleTarget, fg: PixelColor, bg: PixelColor) -> Self {
        let mut console = Self {
            buffer: [[0; Self::COLUMNS]; Self::ROWS],
            cursor_row: 0,
            cursor_column: 0,
            fg,
            bg,
            target,
            cursor_visible: false,
        };
        console.refresh();
        console
    }

    /// コンソール全体の大きさ（ピクセル）
    pub const fn pixel_size() -> Vector2D {
        Vector2D::new(
            Self::COLUMNS as i32 * GLYPH_WIDTH,
            Self::ROWS as i32 * GLYPH_HEIGHT,
        )
    }

    /// 文字列を出力する。
    ///
    /// 最後の列には書かない。行末を超えた文字は次の改行まで捨てる。
    /// ウィンドウ描画でレイヤーと LayerManager があれば、最後に 1 回だけ再描画する。
    pub fn put_string(&mut self, s: &str, layers: Option<&mut LayerManager>) -> Result<()> {
        let target = self.target.clone();
        match &target {
            ConsoleTarget::Screen(writer) => {
                let mut writer = writer.lock();
                self.put_chars(&mut Surface::Screen(&mut *writer), s);
            }
            ConsoleTarget::Window { window, layer } => {
                {
                    let mut window = window.lock();
                    self.put_chars(&mut Surface::Window(&mut *window), s);
                }
                if let (Some(id), Some(layers)) = (layer, layers) {
                    layers.draw_layer(*id)?;
                }
            }
        }
        Ok(())
    }

    /// 画面へ直接描くように切り替える。グリッドの内容を描き直す。
    pub fn set_writer(&mut self, writer: SharedWriter) {
        self.set_target(ConsoleTarget::Screen(writer));
    }

    /// ウィンドウへ描くように切り替える。グリッドの内容を描き直す。
    pub fn set_window(&mut self, window: SharedWindow, layer: Option<LayerId>) {
        self.set_target(ConsoleTarget::Window { window, layer });
    }

    pub fn set_target(&mut self, target: ConsoleTarget) {
        self.target = target;
        self.refresh();
    }

    pub fn target(&self) -> &ConsoleTarget {
        &self.target
    }

    /// (row, column)
    pub fn cursor(&self) -> (usize, usize) {
        (self.cursor_row, self.cursor_column)
    }

    /// row 行目に記録されている文字（空きマスの手前まで）。ROWS 以上なら None。
    pub fn row(&self, row: usize) -> Option<&[u8]> {
        let line = self.buffer.get(row)?;
        let len = line.iter().position(|&c| c == 0).unwrap_or(line.len());
        Some(&line[..len])
    }

    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    /// カーソルの表示・非表示を切り替えて、カーソルのマスだけを描き直す。
    ///
    /// ウィンドウ描画でレイヤーと LayerManager があれば、そのマスの範囲だけ合成し直す。
    pub fn blink_cursor(&mut self, layers: Option<&mut LayerManager>) -> Result<()> {
        self.cursor_visible = !self.cursor_visible;
        let visible = self.cursor_visible;
        let target = self.target.clone();
        match &target {
            ConsoleTarget::Screen(writer) => self.draw_cursor(&mut *writer.lock(), visible),
            ConsoleTarget::Window { window, layer } => {
                self.draw_cursor(&mut *window.lock(), visible);
                if let (Some(id), Some(layers)) = (layer, layers) {
                    let origin = layers.layer(*id)?.position();
                    let cell = Rectangle::new(
                        origin + cell_pos(self.cursor_row, self.cursor_column),
                        cell_size(),
                    );
                    layers.draw(&cell)?;
                }
            }
        }
        Ok(())
    }

    fn put_chars(&mut self, surface: &mut Surface<'_>, s: &str) {
        // 古い位置のカーソルを消しておく。スクロールで一緒に動かさないため。
        if self.cursor_visible {
            self.draw_cursor(surface.writer(), false);
        }
        for c in s.chars() {
            if c == '\n' {
                self.new_line(surface);
            } else if self.cursor_column < Self::COLUMNS - 1 {
                let c = if c.is_ascii() { c as u8 } else { b'?' };
                write_ascii(
                    surface.writer(),
                    cell_pos(self.cursor_row, self.cursor_column),
                    c as char,
                    self.fg,
                    self.bg,
                );
                self.buffer[self.cursor_row][self.cursor_column] = c;
                self.cursor_column += 1;
            }
        }
        if self.cursor_visible {
            self.draw_cursor(surface.writer(), true);
        }
    }

    fn new_line(&mut self, surface: &mut Surface<'_>) {
        self.cursor_column = 0;
        if self.cursor_row < Self::ROWS - 1 {
            self.cursor_row += 1;
            return;
        }

        self.buffer.copy_within(1.., 0);
        self.buffer[Self::ROWS - 1] = [0; Self::COLUMNS];

        let width = Self::COLUMNS as i32 * GLYPH_WIDTH;
        let last_row_y = (Self::ROWS as i32 - 1) * GLYPH_HEIGHT;
        match surface {
            Surface::Window(window) => {
                let src = Rectangle::new(
                    Vector2D::new(0, GLYPH_HEIGHT),
                    Vector2D::new(width, last_row_y),
                );
                window.move_region(Vector2D::ZERO, &src);
                fill_rectangle(
                    &mut **window,
                    Vector2D::new(0, last_row_y),
                    Vector2D::new(width, GLYPH_HEIGHT),
                    self.bg,
                );
            }
            Surface::Screen(writer) => self.redraw(&mut **writer),
        }
    }

    fn refresh(&mut self) {
        let target = self.target.clone();
        match &target {
            ConsoleTarget::Screen(writer) => self.repaint(&mut *writer.lock()),
            ConsoleTarget::Window { window, .. } => self.repaint(&mut *window.lock()),
        }
    }

    /// 全体を描き直し、表示中ならカーソルも描く。
    fn repaint(&self, writer: &mut dyn PixelWriter) {
        self.redraw(writer);
        if self.cursor_visible {
            self.draw_cursor(writer, true);
        }
    }

    /// カーソルのマスを描く。消すときはそのマスの文字（無ければ背景）に戻す。
    fn draw_cursor(&self, writer: &mut dyn PixelWriter, visible: bool) {
        let pos = cell_pos(self.cursor_row, self.cursor_column);
        if visible {
            fill_rectangle(writer, pos, cell_size(), self.fg);
            return;
        }
        match self.buffer[self.cursor_row][self.cursor_column] {
            0 => fill_rectangle(writer, pos, cell_size(), self.bg),
            c => write_ascii(writer, pos, c as char, self.fg, self.bg),
        }
    }

    /// 領域を背景色で塗ってから、グリッドの全行を描く。
    fn redraw(&self, writer: &mut dyn PixelWriter) {
        fill_rectangle(writer, Vector2D::ZERO, Self::pixel_size(), self.bg);
        for (row, line) in self.buffer.iter().enumerate() {
            for (column, &c) in line.iter().take_while(|&&c| c != 0).enumerate() {
                write_ascii(writer, cell_pos(row, column), c as char, self.fg, self.bg);
            }
        }
    }
}

fn cell_pos(row: usize, column: usize) -> Vector2D {
    Vector2D::new(column as i32 * GLYPH_WIDTH, row as i32 * GLYPH_HEIGHT)
}

const fn cell_size() -> Vector2D {
    Vector2D::new(GLYPH_WIDTH, GLYPH_HEIGHT)
}
