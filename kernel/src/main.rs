#![no_main]
#![no_std]
#![feature(abi_x86_interrupt)]
#![feature(alloc_error_handler)]

extern crate alloc;

mod allocator;
mod desktop;
mod framebuffer;
mod interrupts;
mod logger;
mod mouse;
mod panic;
mod queue;
mod serial;

use core::fmt::{self, Write};
use uefi::prelude::*;
use uefi::proto::console::gop::GraphicsOutput;

use crate::desktop::{print_early, Desktop};
use crate::framebuffer::FramebufferInfo;

#[entry]
fn main() -> Status {
    uefi::system::with_stdout(|stdout| {
        let _ = stdout.write_str("Hello, mado!\r\n");
    });

    // --- GOP からフレームバッファ情報を控える ---
    // ExitBootServices の後は GOP が使えないが、フレームバッファのメモリは残る。
    let gop_handle = match uefi::boot::get_handle_for_protocol::<GraphicsOutput>() {
        Ok(handle) => handle,
        Err(e) => return boot_failed(format_args!("GOP not found: {:?}", e)),
    };
    let mut gop = match uefi::boot::open_protocol_exclusive::<GraphicsOutput>(gop_handle) {
        Ok(gop) => gop,
        Err(e) => return boot_failed(format_args!("failed to open GOP: {:?}", e)),
    };
    let fb_info = match FramebufferInfo::from_gop(&mut gop) {
        Ok(info) => info,
        Err(e) => return boot_failed(format_args!("unusable frame buffer: {}", e)),
    };
    drop(gop);

    uefi::system::with_stdout(|stdout| {
        let _ = write!(
            stdout,
            "GOP: {}x{} stride={} {:?} at {:#x}\r\nExiting boot services...\r\n",
            fb_info.config.width,
            fb_info.config.height,
            fb_info.config.stride,
            fb_info.config.format,
            fb_info.fb_addr
        );
    });

    let memory_map = unsafe { uefi::boot::exit_boot_services(None) };

    // =================================================================
    // ここからはカーネルの世界
    // =================================================================

    logger::init();
    interrupts::init();
    allocator::init(&memory_map);

    let screen = match fb_info.into_frame_buffer() {
        Ok(screen) => screen,
        Err(e) => fatal("frame buffer", e),
    };

    let mut console = desktop::draw_boot_screen(&screen);
    print_early(&mut console, format_args!("Welcome to mado!\n"));
    print_early(
        &mut console,
        format_args!(
            "Resolution: {}x{} ({:?})\n",
            fb_info.config.width, fb_info.config.height, fb_info.config.format
        ),
    );

    match mouse::init() {
        Ok(()) => print_early(&mut console, format_args!("PS/2 mouse enabled.\n")),
        Err(e) => {
            log::warn!("mouse: init failed: {:?}", e);
            print_early(&mut console, format_args!("Mouse not available.\n"));
        }
    }

    let mut desktop = match Desktop::new(screen, console, fb_info.screen_config()) {
        Ok(desktop) => desktop,
        Err(e) => fatal("desktop", e),
    };
    if let Err(e) = desktop.print(format_args!("Desktop ready. Drag the window with the mouse.\n")) {
        fatal("console", e);
    }

    x86_64::instructions::interrupts::enable();

    // --- メインループ ---
    // キューを見る間だけ割り込みを止める。空なら sti+hlt をアトミックに実行して待つ
    // （チェックと hlt の間に来た割り込みを取りこぼさない）。
    loop {
        x86_64::instructions::interrupts::disable();
        let Some(msg) = queue::pop() else {
            x86_64::instructions::interrupts::enable_and_hlt();
            continue;
        };
        x86_64::instructions::interrupts::enable();

        if let Err(e) = desktop.handle(msg) {
            panic!("failed to handle {:?}: {}", msg, e);
        }

        let dropped = queue::take_dropped();
        if dropped > 0 {
            log::warn!("queue full: dropped {} messages", dropped);
        }
    }
}

/// ExitBootServices の前に失敗したら UEFI の画面に出して戻る。
fn boot_failed(args: fmt::Arguments) -> Status {
    uefi::system::with_stdout(|stdout| {
        let _ = stdout.write_fmt(args);
        let _ = stdout.write_str("\r\n");
    });
    Status::UNSUPPORTED
}

/// 起動途中の致命的なエラー。ログに残して止まる。
fn fatal(what: &str, e: mado_gfx::Error) -> ! {
    log::error!("{}: {}", what, e);
    halt()
}

/// 割り込みを止めて CPU を停止する。
pub fn halt() -> ! {
    x86_64::instructions::interrupts::disable();
    loop {
        x86_64::instructions::hlt();
    }
}
