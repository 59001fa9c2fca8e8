// queue.rs — 割り込みハンドラからメインループへのメッセージキュー
//
// 積むのは割り込みハンドラ、取り出すのはメインループだけ（単一生産者・単一消費者）。
// 固定長の heapless::Deque なので、割り込みコンテキストでヒープを触らない。
//
// pop() は割り込みを止めた状態で呼ぶこと。ハンドラが同じロックを取りに来ても
// 単一コアではハンドラ側が先に終わるので、マスクしておけば衝突しない。

use core::sync::atomic::{AtomicUsize, Ordering};

use heapless::Deque;
use spin::Mutex;

/// キューの容量
pub const QUEUE_CAPACITY: usize = 32;

pub use mado_ps2::PointerReport;

#[derive(Debug, Clone, Copy)]
pub enum Message {
    Pointer(PointerReport),
    /// その時点のティック数
    Tick(u64),
}

static QUEUE: Mutex<Deque<Message, QUEUE_CAPACITY>> = Mutex::new(Deque::new());
static DROPPED: AtomicUsize = AtomicUsize::new(0);

/// 割り込みハンドラから呼ぶ。満杯なら捨てて数だけ数える。
pub fn push(msg: Message) {
    if QUEUE.lock().push_back(msg).is_err() {
        DROPPED.fetch_add(1, Ordering::Relaxed);
    }
}

/// 割り込み禁止中に呼ぶこと。
pub fn pop() -> Option<Message> {
    debug_assert!(!x86_64::instructions::interrupts::are_enabled());
    QUEUE.lock().pop_front()
}

/// 前回呼んでから捨てたメッセージ数
pub fn take_dropped() -> usize {
    DROPPED.swap(0, Ordering::Relaxed)
}
