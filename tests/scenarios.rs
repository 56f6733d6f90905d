// SPDX-License-Identifier: MIT

//! End-to-end scenarios across translation, decoding and the drivers.

use std::sync::Arc;

use riscv_hart::bus::MainMemory;
use riscv_hart::hart::block::BlockHart;
use riscv_hart::hart::icache::ICacheHart;
use riscv_hart::hart::simple::SimpleHart;
use riscv_hart::hart::HartConfig;
use riscv_hart::hart::Tickable;
use riscv_hart::machine_state::csregisters::CSRegister;
use riscv_hart::machine_state::mode::Mode;
use riscv_hart::machine_state::registers::{t1, x1, x2, x3, x5};
use riscv_hart::traps::Exception;
use riscv_hart::xlen::Rv64;

const RAM_BASE: u64 = 0x8000_0000;
const RAM_SIZE: usize = 1 << 20;

/// Sv39 page-table fixture:
///
/// - root table at `0x8000_4000`, mid table at `0x8000_5000`, leaf table
///   at `0x8000_6000`;
/// - VA `0x1000` -> PA `0x8000_1000`, RWX, supervisor-only;
/// - VA `0x2000` -> PA `0x8000_2000`, RWX, supervisor-only;
/// - VA `0x3000` -> PA `0x8000_2000`, RWX, user;
/// - VA `0x4000` -> PA `0x8000_7000` and VA `0x5000` -> PA `0x8000_9000`
///   (deliberately discontiguous), supervisor data pages.
///
/// Returns the satp value selecting these tables.
fn build_sv39_tables(mem: &MainMemory<Rv64>) -> u64 {
    const V: u64 = 1 << 0;
    const R: u64 = 1 << 1;
    const W: u64 = 1 << 2;
    const X: u64 = 1 << 3;
    const U: u64 = 1 << 4;
    const A: u64 = 1 << 6;
    const D: u64 = 1 << 7;

    let root = 0x8000_4000u64;
    let mid = 0x8000_5000u64;
    let leaf = 0x8000_6000u64;

    let pointer = |table: u64| ((table >> 12) << 10) | V;
    let mapping = |target: u64, flags: u64| ((target >> 12) << 10) | flags | V | A | D;

    // vpn[2] = 0 and vpn[1] = 0 for every VA below 2 MiB
    mem.write_u64(root, pointer(mid));
    mem.write_u64(mid, pointer(leaf));

    mem.write_u64(leaf + 8, mapping(0x8000_1000, R | W | X));
    mem.write_u64(leaf + 2 * 8, mapping(0x8000_2000, R | W | X));
    mem.write_u64(leaf + 3 * 8, mapping(0x8000_2000, R | W | X | U));
    mem.write_u64(leaf + 4 * 8, mapping(0x8000_7000, R | W));
    mem.write_u64(leaf + 5 * 8, mapping(0x8000_9000, R | W));

    // satp: Sv39 with the root PPN
    (8 << 60) | (root >> 12)
}

/// A paged 64-bit hart plus a handle on its RAM.
fn paged_hart(striding: bool) -> (SimpleHart<Rv64>, Arc<MainMemory<Rv64>>) {
    let mem = Arc::new(MainMemory::<Rv64>::new(RAM_BASE, RAM_SIZE));
    let satp = build_sv39_tables(&mem);

    let config = HartConfig {
        stride_across_pages: striding,
        ..HartConfig::default()
    };
    let mut hart = SimpleHart::new(mem.clone(), None, &config, RAM_BASE).unwrap();
    hart.before_first_tick();
    hart.core.hart.csregisters.write(CSRegister::satp, satp);
    (hart, mem)
}

// Scenario 2: a 64-bit hart in Sv39. The supervisor-only mapping is
// loadable from S-mode, and load-page-faults from U-mode with the
// faulting VA in stval.
#[test]
fn sv39_load_respects_the_u_bit() {
    // lw x5, 0(x1), reachable at VA 0x2000 (S) and VA 0x3000 (U).
    const LW_X5: u32 = 0x0000_A283;

    // S-mode load succeeds, even with SUM = 0: the page is not a user
    // page.
    {
        let (mut hart, mem) = paged_hart(true);
        mem.write_u32(0x8000_2000, LW_X5);
        mem.write_u32(0x8000_1000, 0x500D_FEED);

        hart.core.hart.set_mode(Mode::Supervisor);
        hart.core.hart.xregisters.write(x1, 0x1000);
        hart.core.hart.next_pc = 0x2000;

        assert_eq!(hart.tick(), 1);
        assert_eq!(hart.core.hart.xregisters.read(x5), 0x500D_FEED);
    }

    // The same load from U-mode faults, delegated to S-mode.
    {
        let (mut hart, mem) = paged_hart(true);
        mem.write_u32(0x8000_2000, LW_X5);

        hart.core
            .hart
            .csregisters
            .write(CSRegister::medeleg, 1u64 << 13);
        hart.core.hart.csregisters.write(CSRegister::stvec, 0x2000u64);
        hart.core.hart.set_mode(Mode::User);
        hart.core.hart.xregisters.write(x1, 0x1000);
        // The user executes from the U=1 alias of the code page.
        hart.core.hart.next_pc = 0x3000;

        assert_eq!(hart.tick(), 0);
        assert_eq!(hart.core.hart.mode, Mode::Supervisor);
        assert_eq!(hart.core.hart.csregisters.read(CSRegister::scause), 13u64);
        assert_eq!(hart.core.hart.csregisters.read(CSRegister::stval), 0x1000u64);
        assert_eq!(hart.core.hart.csregisters.read(CSRegister::sepc), 0x3000u64);
    }
}

// Boundary: a load crossing a page boundary transfers everything in
// striding mode (two walks, discontiguous physical pages) and truncates
// at the page end otherwise.
#[test]
fn page_crossing_loads() {
    let (mut hart, mem) = paged_hart(true);
    hart.core.hart.set_mode(Mode::Supervisor);

    // Four bytes at the end of the VA 0x4000 page, four at the start of
    // the VA 0x5000 page - physically far apart.
    mem.write_u32(0x8000_7FFC, 0x4433_2211);
    mem.write_u32(0x8000_9000, 0x8877_6655);

    let mut buf = [0u8; 8];
    let transferred = hart.core.read_virtual(0x4FFC, &mut buf).unwrap();
    assert_eq!(transferred, 8);
    assert_eq!(buf, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);

    // Crossing into an unmapped page transfers nothing at all.
    let mut buf = [0u8; 8];
    assert_eq!(
        hart.core.read_virtual(0x5FFC, &mut buf),
        Err(Exception::LoadPageFault(0x6000))
    );

    // Non-striding mode truncates at the page end.
    let (mut hart, _mem) = paged_hart(false);
    hart.core.hart.set_mode(Mode::Supervisor);
    let mut buf = [0u8; 8];
    let transferred = hart.core.read_virtual(0x4FFC, &mut buf).unwrap();
    assert_eq!(transferred, 4);
}

// Boundary: a compressed instruction in the last halfword of a mapped
// page executes even though the next page is unmapped.
#[test]
fn compressed_fetch_at_the_end_of_a_mapped_page() {
    let (mut hart, mem) = paged_hart(true);
    hart.core.hart.set_mode(Mode::Supervisor);

    // c.addi x5, 1 in the very last halfword of the VA 0x2000 page.
    mem.write_u16(0x8000_2FFE, 0x0285);
    hart.core.hart.next_pc = 0x2FFE;

    assert_eq!(hart.tick(), 1);
    assert_eq!(hart.core.hart.xregisters.read(x5), 1);
    assert_eq!(hart.core.hart.next_pc, 0x3000);
}

// Boundary: SFENCE.VMA makes a remapped translation visible.
#[test]
fn sfence_vma_flushes_cached_translations() {
    let (mut hart, mem) = paged_hart(true);
    hart.core.hart.set_mode(Mode::Supervisor);

    mem.write_u64(0x8000_1000, 111);
    mem.write_u64(0x8000_2000, 222);

    let mut buf = [0u8; 8];
    hart.core.read_virtual(0x1000, &mut buf).unwrap();
    assert_eq!(u64::from_le_bytes(buf), 111);

    // Remap VA 0x1000 to PA 0x8000_2000. The old translation is cached.
    let leaf = 0x8000_6000u64;
    mem.write_u64(leaf + 8, ((0x8000_2000u64 >> 12) << 10) | 0xCF);

    let (_, misses_before) = hart.core.translation_cache_counters();
    hart.core.read_virtual(0x1000, &mut buf).unwrap();
    assert_eq!(u64::from_le_bytes(buf), 111, "stale mapping still cached");
    let (_, misses_mid) = hart.core.translation_cache_counters();
    assert_eq!(misses_before, misses_mid, "the stale read hit the cache");

    hart.core.run_sfence_vma(x1, x2).unwrap();
    hart.core.service_events();

    hart.core.read_virtual(0x1000, &mut buf).unwrap();
    assert_eq!(u64::from_le_bytes(buf), 222, "fresh walk after the fence");
    let (_, misses_after) = hart.core.translation_cache_counters();
    assert!(misses_after > misses_mid, "the fence forced a fresh walk");
}

// Scenario 4: a trap in the middle of a recorded block stops the block,
// and re-entry resumes from the faulting instruction.
#[test]
fn trap_mid_block_stops_the_replay() {
    let mem = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
    // L: lw   x1, 0(x2)
    //    addi x3, x3, 1
    //    jal  x0, L
    mem.write_u32(0, 0x0001_2083);
    mem.write_u32(4, 0x0011_8193);
    mem.write_u32(8, 0xFF9F_F06F);

    let config = HartConfig {
        max_block_length: 4,
        ..HartConfig::default()
    };
    let mut hart = BlockHart::new(mem, None, &config, 0u64).unwrap();
    hart.before_first_tick();
    hart.core.hart.xregisters.write(x2, 0x100);

    // First pass records and executes the whole block.
    assert_eq!(hart.tick(), 3);
    assert_eq!(hart.core.hart.xregisters.read(x3), 1);

    // Point the load at unmapped memory: replay must stop at the load,
    // with the addi not retiring.
    hart.core.hart.xregisters.write(x2, 0x80_0000);
    assert_eq!(hart.tick(), 0);
    assert_eq!(hart.core.hart.xregisters.read(x3), 1, "addi must not retire");
    assert_eq!(hart.core.hart.csregisters.read(CSRegister::mepc), 0u64);

    // "Return" from the handler with the load fixed: the block re-enters
    // from the load and runs to completion.
    hart.core.hart.xregisters.write(x2, 0x100);
    hart.core.hart.next_pc = 0;
    assert_eq!(hart.tick(), 3);
    assert_eq!(hart.core.hart.xregisters.read(x3), 2);
}

// Scenario 5: writing MISA to disable C reconfigures the decoder, so a
// subsequent compressed fetch is an illegal instruction.
#[test]
fn disabling_c_makes_compressed_encodings_illegal() {
    let mem = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
    // 0: csrrc x0, misa, t1   (t1 holds the C bit)
    // 4: c.addi x5, 1         (fetched after the MISA write)
    mem.write_u32(0, 0x3013_3073);
    mem.write_u16(4, 0x0285);

    let mut hart = ICacheHart::new(mem, None, &HartConfig::default(), 0u64).unwrap();
    hart.before_first_tick();
    hart.core.hart.xregisters.write(t1, 0b100); // the 'c' letter bit

    assert_eq!(hart.tick(), 1);
    // The compressed instruction no longer decodes...
    assert_eq!(hart.tick(), 0);
    assert_eq!(hart.core.hart.csregisters.read(CSRegister::mcause), 2u64);
    // ...and nothing executed it.
    assert_eq!(hart.core.hart.xregisters.read(x5), 0);
}

// All drivers retire the same architectural state for the same program.
#[test]
fn drivers_agree_on_a_mixed_program() {
    const PROGRAM: &[(u64, u32)] = &[
        (0, 0x0050_0093),  // addi x1, x0, 5
        (4, 0x0010_0113),  // addi x2, x0, 1
        (8, 0x0020_8133),  // add  x2, x1, x2
        (12, 0x4020_81B3), // sub  x3, x1, x2
        (16, 0x0000_0073), // ecall
    ];

    fn make_mem() -> Arc<MainMemory<Rv64>> {
        let mem = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
        for &(addr, word) in PROGRAM {
            mem.write_u32(addr, word);
        }
        mem
    }

    // Tick until the ecall trap lands, counting retirements.
    macro_rules! run_until_ecall {
        ($hart:expr) => {{
            let mut retired = 0;
            for _ in 0..20 {
                retired += $hart.tick();
                let mcause: u64 = $hart.core.hart.csregisters.read(CSRegister::mcause);
                if mcause == 11 {
                    break;
                }
            }

            for (reg, expected) in [(x1, 5u64), (x2, 6), (x3, -1i64 as u64)] {
                assert_eq!($hart.core.hart.xregisters.read(reg), expected);
            }
            retired
        }};
    }

    let mut simple = SimpleHart::new(make_mem(), None, &HartConfig::default(), 0u64).unwrap();
    simple.before_first_tick();
    assert_eq!(run_until_ecall!(simple), 4);

    let mut block = BlockHart::new(make_mem(), None, &HartConfig::default(), 0u64).unwrap();
    block.before_first_tick();
    assert_eq!(run_until_ecall!(block), 4);

    let mut icache = ICacheHart::new(make_mem(), None, &HartConfig::default(), 0u64).unwrap();
    icache.before_first_tick();
    assert_eq!(run_until_ecall!(icache), 4);
}

// The translation cache answers repeated accesses without walking, and
// a satp write forces fresh walks.
#[test]
fn translation_cache_hits_and_invalidation() {
    let (mut hart, _mem) = paged_hart(true);
    hart.core.hart.set_mode(Mode::Supervisor);

    let mut buf = [0u8; 4];
    hart.core.read_virtual(0x1000, &mut buf).unwrap();
    let (hits_a, misses_a) = hart.core.translation_cache_counters();
    assert_eq!((hits_a, misses_a), (0, 1));

    hart.core.read_virtual(0x1004, &mut buf).unwrap();
    let (hits_b, misses_b) = hart.core.translation_cache_counters();
    assert_eq!((hits_b, misses_b), (1, 1));

    // Rewriting satp (even with the same value) invalidates.
    let satp = hart.core.hart.csregisters.read(CSRegister::satp);
    let events = hart.core.hart.csregisters.write(CSRegister::satp, satp);
    hart.core.hart.notify(events);
    hart.core.service_events();

    hart.core.read_virtual(0x1000, &mut buf).unwrap();
    let (_, misses_c) = hart.core.translation_cache_counters();
    assert_eq!(misses_c, misses_b + 1, "a fresh walk after the satp write");
}

// Without a control transfer, the PC advances by exactly the width of
// the retired instruction.
#[test]
fn pc_advances_by_instruction_width() {
    let mem = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
    mem.write_u16(0, 0x0285); // c.addi x5, 1
    mem.write_u32(2, 0x0012_8293); // addi x5, x5, 1
    mem.write_u16(6, 0x0285); // c.addi x5, 1

    let mut hart = SimpleHart::new(mem, None, &HartConfig::default(), 0u64).unwrap();
    hart.before_first_tick();

    hart.tick();
    assert_eq!(hart.core.hart.next_pc, 2);
    hart.tick();
    assert_eq!(hart.core.hart.next_pc, 6);
    hart.tick();
    assert_eq!(hart.core.hart.next_pc, 8);
    assert_eq!(hart.core.hart.xregisters.read(x5), 3);
}

// Interrupts are delivered at the end of a tick, with xepc holding the
// *next* instruction rather than the current one.
#[test]
fn interrupts_are_taken_between_ticks() {
    use riscv_hart::traps::Interrupt;

    let mem = Arc::new(MainMemory::<Rv64>::new(0, 0x1000));
    mem.write_u32(0, 0x0012_8293); // addi x5, x5, 1
    mem.write_u32(4, 0x0012_8293);

    let mut hart = SimpleHart::new(mem, None, &HartConfig::default(), 0u64).unwrap();
    hart.before_first_tick();
    hart.core.hart.csregisters.write(CSRegister::mtvec, 0x100u64);
    hart.core.hart.csregisters.write(
        CSRegister::mie,
        1u64 << Interrupt::MACHINE_SOFTWARE_EXCEPTION_CODE,
    );
    let mstatus = hart.core.hart.csregisters.mstatus().with_mie(true);
    hart.core.hart.csregisters.set_mstatus(mstatus);

    hart.core.hart.csregisters.set_interrupt_pending(Interrupt::MachineSoftware);

    // The instruction retires, then the interrupt vectors.
    assert_eq!(hart.tick(), 1);
    assert_eq!(hart.core.hart.xregisters.read(x5), 1);
    assert_eq!(hart.core.hart.next_pc, 0x100);
    assert_eq!(hart.core.hart.csregisters.read(CSRegister::mepc), 4u64);

    let mcause: u64 = hart.core.hart.csregisters.read(CSRegister::mcause);
    assert_eq!(mcause, (1 << 63) | 3);
}
