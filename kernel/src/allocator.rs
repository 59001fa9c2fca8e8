// allocator.rs — カーネルヒープ
//
// Window のピクセル配列やバックバッファは画面サイズに比例して大きいので、
// 解放して再利用できる linked_list_allocator (LockedHeap) を使う。
//
// ヒープ領域は UEFI メモリマップの CONVENTIONAL 領域（1 MiB 以上）から
// 一番大きく取れるところを選ぶ。見つからなければ BSS の固定領域を使う。

use core::alloc::Layout;
use linked_list_allocator::LockedHeap;
use uefi::mem::memory_map::{MemoryMap, MemoryMapOwned, MemoryType};

const PAGE_SIZE: u64 = 4096;
const HEAP_SIZE_DEFAULT: u64 = 64 * 1024 * 1024;
const HEAP_SIZE_MIN: u64 = 16 * 1024 * 1024;
const HEAP_SIZE_FALLBACK: usize = 16 * 1024 * 1024;

#[repr(align(16))]
struct HeapMemory {
    _data: [u8; HEAP_SIZE_FALLBACK],
}

static mut HEAP_MEMORY: HeapMemory = HeapMemory { _data: [0; HEAP_SIZE_FALLBACK] };

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// 割り込みを有効にする前、alloc を使う前に呼ぶこと。
pub fn init(memory_map: &MemoryMapOwned) {
    let (start, size, source) = match select_heap_region(memory_map) {
        Some((start, size)) => (start as *mut u8, size as usize, "conventional"),
        None => (&raw mut HEAP_MEMORY as *mut u8, HEAP_SIZE_FALLBACK, "bss"),
    };

    unsafe {
        ALLOCATOR.lock().init(start, size);
    }
    log::info!(
        "heap: {:#x} - {:#x} ({} MiB, {})",
        start as u64,
        start as u64 + size as u64,
        size / 1024 / 1024,
        source
    );
}

/// CONVENTIONAL 領域の後ろ半分を候補にして、一番大きいものを選ぶ。
fn select_heap_region(memory_map: &MemoryMapOwned) -> Option<(u64, u64)> {
    memory_map
        .entries()
        .filter(|desc| desc.ty == MemoryType::CONVENTIONAL && desc.phys_start >= 0x10_0000)
        .map(|desc| {
            let region_size = desc.page_count * PAGE_SIZE;
            let size = HEAP_SIZE_DEFAULT.min(region_size / 2) & !(PAGE_SIZE - 1);
            let start = (desc.phys_start + region_size - size) & !(PAGE_SIZE - 1);
            (start, size)
        })
        .filter(|&(_, size)| size >= HEAP_SIZE_MIN)
        .max_by_key(|&(_, size)| size)
}

/// Window や FrameBuffer の確保は try_reserve で失敗を返すので、
/// ここに来るのはそれ以外の確保が失敗したとき。
#[alloc_error_handler]
fn alloc_error_handler(layout: Layout) -> ! {
    let heap = ALLOCATOR.lock();
    log::error!(
        "alloc failed: size={} align={} (heap used={} free={})",
        layout.size(),
        layout.align(),
        heap.used(),
        heap.free()
    );
    drop(heap);
    panic!("out of memory");
}
