use std::io::Read;
use std::ptr;

use libc::sbrk;
use rallocator::{Allocator, CheckMode, SbrkHeapProvider};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how the program break moves between steps.
fn block_until_enter_pressed() {
    println!("\n>>> Press ENTER to continue...");
    let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
    println!(
        "[{}] PID = {}, program break (sbrk(0)) = {:?}",
        label,
        std::process::id(),
        unsafe { sbrk(0) },
    );
}

fn main() {
    env_logger::init();

    // Our best-fit allocator, backed by the real process break via sbrk.
    // Unlike a bump allocator it recycles freed blocks through a small
    // free list (exact-size matches) and a size-ordered BST (best fit).
    let mut allocator = Allocator::new(SbrkHeapProvider::new().expect("sbrk unavailable")).expect(
        "failed to reserve the prologue/epilogue words for the initial heap",
    );

    unsafe {
        print_program_break("start");
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 1) Allocate three 32-byte blocks.
        // --------------------------------------------------------------
        println!("\n[1] Allocate three 32-byte blocks");
        let a = allocator.malloc(32).unwrap();
        let b = allocator.malloc(32).unwrap();
        let c = allocator.malloc(32).unwrap();
        println!("[1] a={a:?} b={b:?} c={c:?}");
        allocator.check_heap(CheckMode::All).unwrap();
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 2) Free the first and third, keeping the middle one allocated.
        //    Neither free can coalesce with the other (b sits between them).
        // --------------------------------------------------------------
        println!("\n[2] Free a and c, leaving b allocated between two free blocks");
        allocator.free(a);
        allocator.free(c);
        allocator.check_heap(CheckMode::All).unwrap();
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 3) Allocate a smaller block: best-fit should reuse one of the
        //    32-byte holes rather than growing the heap.
        // --------------------------------------------------------------
        println!("\n[3] Allocate 24 bytes (best-fit should reuse a or c's slot)");
        let d = allocator.malloc(24).unwrap();
        println!("[3] d={d:?} (a={a:?}, c={c:?})");
        println!("[3] reused a freed slot? {}", d == a || d == c);
        allocator.check_heap(CheckMode::All).unwrap();
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 4) Free everything, forcing a four-way coalesce down to a single
        //    free block before the epilogue.
        // --------------------------------------------------------------
        println!("\n[4] Free b and d: remaining free space should coalesce");
        allocator.free(b);
        allocator.free(d);
        allocator.check_heap(CheckMode::All).unwrap();
        block_until_enter_pressed();

        // --------------------------------------------------------------
        // 5) Allocate something larger than the current heap, forcing
        //    extend_heap to grow the program break.
        // --------------------------------------------------------------
        print_program_break("before large alloc");
        println!("\n[5] Allocate a 64 KiB block, observe sbrk(0) move");
        let big = allocator.malloc(64 * 1024).unwrap();
        ptr::write_bytes(big, 0xAB, 64 * 1024);
        print_program_break("after large alloc");
        allocator.check_heap(CheckMode::All).unwrap();
        block_until_enter_pressed();

        allocator.free(big);
        println!("\n[6] End of walkthrough. The heap is never shrunk back to the OS.");
    }
}
