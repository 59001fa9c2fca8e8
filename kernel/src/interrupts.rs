// interrupts.rs — IDT と割り込みハンドラ
//
// CPU 例外はすべて panic にしてシリアルへ出す（breakpoint だけは戻る）。
// ハードウェア割り込みは 8259 PIC 経由で受ける:
//   IRQ 0  タイマー (PIT, 約 18.2 Hz) → ティックを数え、一定間隔で Tick を積む
//   IRQ 12 PS/2 マウス → 3 バイト揃ったら Pointer を積む
//
// ハンドラはキューに積むだけで、描画はしない。描画はメインループの仕事。

use core::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use pic8259::ChainedPics;
use spin::Mutex;
use x86_64::instructions::port::Port;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

use crate::mouse;
use crate::queue::{self, Message};

/// IRQ 0 → IDT 32
pub const PIC_1_OFFSET: u8 = 32;
/// IRQ 8 → IDT 40
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

/// マスタ: IRQ0 (タイマー) と IRQ2 (スレーブのカスケード) だけ通す。
/// IRQ1 (キーボード) は通さないので、mouse::init でキーボードポート自体も止める。
const PIC_1_MASK: u8 = !0b0000_0101;
/// スレーブ: IRQ12 (マウス) だけ通す
const PIC_2_MASK: u8 = !0b0001_0000;

/// この回数ごとに Tick メッセージを積む（約 1 秒）
pub const TICKS_PER_MESSAGE: u64 = 18;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

static TICKS: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET,
    Mouse = PIC_2_OFFSET + 4,
}

impl InterruptIndex {
    fn as_u8(self) -> u8 {
        self as u8
    }
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        idt.divide_error.set_handler_fn(divide_error_handler);
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
        idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
        idt.page_fault.set_handler_fn(page_fault_handler);
        idt.double_fault.set_handler_fn(double_fault_handler);

        idt[InterruptIndex::Timer.as_u8()].set_handler_fn(timer_interrupt_handler);
        idt[InterruptIndex::Mouse.as_u8()].set_handler_fn(mouse_interrupt_handler);
        idt
    };
}

/// IDT をロードして PIC をリマップする。割り込みの有効化は呼び出し側で行う。
pub fn init() {
    IDT.load();
    unsafe {
        let mut pics = PICS.lock();
        pics.initialize();
        pics.write_masks(PIC_1_MASK, PIC_2_MASK);
    }
    log::debug!("interrupts: IDT loaded, PIC remapped to {}/{}", PIC_1_OFFSET, PIC_2_OFFSET);
}

/// 起動してからのタイマー割り込み回数
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

// =================================================================
// CPU 例外
// =================================================================

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    panic!("CPU EXCEPTION: DIVIDE ERROR (#DE)\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    log::warn!("breakpoint at {:#x}", stack_frame.instruction_pointer.as_u64());
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    panic!("CPU EXCEPTION: INVALID OPCODE (#UD)\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    panic!(
        "CPU EXCEPTION: GENERAL PROTECTION FAULT (#GP)\nError code: {}\n{:#?}",
        error_code, stack_frame
    );
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;
    panic!(
        "CPU EXCEPTION: PAGE FAULT (#PF)\nAccessed address: {:?}\nError code: {:?}\n{:#?}",
        Cr2::read(),
        error_code,
        stack_frame
    );
}

extern "x86-interrupt" fn double_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) -> ! {
    panic!(
        "CPU EXCEPTION: DOUBLE FAULT (#DF)\nError code: {}\n{:#?}",
        error_code, stack_frame
    );
}

// =================================================================
// ハードウェア割り込み
// =================================================================

extern "x86-interrupt" fn timer_interrupt_handler(_stack_frame: InterruptStackFrame) {
    let ticks = TICKS.fetch_add(1, Ordering::Relaxed) + 1;
    if ticks % TICKS_PER_MESSAGE == 0 {
        queue::push(Message::Tick(ticks));
    }

    unsafe {
        PICS.lock().notify_end_of_interrupt(InterruptIndex::Timer.as_u8());
    }
}

/// 0x60 を読まないと次の IRQ12 が来ない。
extern "x86-interrupt" fn mouse_interrupt_handler(_stack_frame: InterruptStackFrame) {
    let mut port: Port<u8> = Port::new(0x60);
    let byte = unsafe { port.read() };
    if let Some(report) = mouse::handle_irq_byte(byte) {
        queue::push(Message::Pointer(report));
    }

    unsafe {
        PICS.lock().notify_end_of_interrupt(InterruptIndex::Mouse.as_u8());
    }
}
