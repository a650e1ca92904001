use beemo::cartridge;
use beemo::memory::Memory;
use beemo::motherboard::MotherBoard;
use std::path::PathBuf;

fn write_temp(name: &str, bytes: &[u8]) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("beemo-test-{}-{}", std::process::id(), name));
    std::fs::write(&p, bytes).unwrap();
    p
}

// A ROM-only image with the header area zeroed: type 0x00, no external RAM.
fn blank_rom() -> Vec<u8> {
    vec![0x00; 0x8000]
}

fn nop_bootrom() -> Vec<u8> {
    vec![0x00; 0x100]
}

fn machine(name: &str, rom: Vec<u8>, bootrom: Vec<u8>) -> MotherBoard {
    let rom_path = write_temp(&format!("{}.gb", name), &rom);
    let bootrom_path = write_temp(&format!("{}-boot.gb", name), &bootrom);
    MotherBoard::power_up(rom_path, bootrom_path).unwrap()
}

#[test]
fn bootrom_hands_off_to_the_cartridge() {
    // The bootrom disables its own overlay by writing 0x11 to 0xff50; reads
    // at 0x0000 must switch from bootrom to cartridge bytes at once.
    let mut bootrom = nop_bootrom();
    bootrom[0x00..0x06].copy_from_slice(&[
        0x21, 0x50, 0xff, // LD HL, 0xff50
        0x3e, 0x11, // LD A, 0x11
        0x77, // LD (HL), A
    ]);
    let mut rom = blank_rom();
    rom[0x0000] = 0xaa;
    rom[0x0006] = 0x18; // JR -2: the cartridge parks the CPU
    rom[0x0007] = 0xfe;

    let mut mbrd = machine("handoff", rom, bootrom);
    assert_eq!(mbrd.mmu.get(0x0000), 0x21);
    for _ in 0..3 {
        mbrd.next().unwrap();
    }
    assert_eq!(mbrd.mmu.get(0x0000), 0xaa);
    // Execution continues into the cartridge's loop.
    mbrd.next().unwrap();
    assert_eq!(mbrd.pc(), 0x0006);
}

#[test]
fn timer_interrupt_vectors_the_cpu() {
    let mut mbrd = machine("timer-irq", blank_rom(), nop_bootrom());
    // Park the CPU on NOPs in work RAM with the timer at its fastest rate
    // and one increment away from overflow.
    mbrd.cpu.reg.pc = 0xc000;
    mbrd.cpu.reg.sp = 0xdffe;
    mbrd.cpu.ime = true;
    mbrd.mmu.set(0xffff, 0x04);
    mbrd.mmu.set(0xff05, 0xff);
    mbrd.mmu.set(0xff07, 0x05);
    for _ in 0..4 {
        mbrd.next().unwrap();
    }
    assert_eq!(mbrd.mmu.get(0xff0f) & 0x04, 0x04);
    let cycles = mbrd.next().unwrap();
    assert_eq!(cycles, 5);
    assert_eq!(mbrd.pc(), 0x0050);
    assert_eq!(mbrd.mmu.get(0xff0f) & 0x04, 0x00);
    assert_eq!(mbrd.mmu.get_word(0xdffc), 0xc004);
}

#[test]
fn a_frame_sums_to_17556_machine_cycles() {
    let mut mbrd = machine("frame-sum", blank_rom(), nop_bootrom());
    // Spin on JR -2 with the LCD on and count cycles between vblank latches.
    mbrd.mmu.set(0xc000, 0x18);
    mbrd.mmu.set(0xc001, 0xfe);
    mbrd.cpu.reg.pc = 0xc000;
    mbrd.mmu.set(0xff40, 0x91);
    while !mbrd.check_and_reset_vblank() {
        mbrd.next().unwrap();
    }
    let mut cycles = 0;
    loop {
        cycles += mbrd.next().unwrap();
        if mbrd.check_and_reset_vblank() {
            break;
        }
    }
    assert_eq!(cycles, 17556);
}

#[test]
fn vblank_interrupt_reaches_the_cpu() {
    let mut mbrd = machine("vblank-irq", blank_rom(), nop_bootrom());
    // Park on JR -2 until the frame reaches vertical blank.
    mbrd.mmu.set(0xc000, 0x18);
    mbrd.mmu.set(0xc001, 0xfe);
    mbrd.cpu.reg.pc = 0xc000;
    mbrd.cpu.reg.sp = 0xdffe;
    mbrd.cpu.ime = true;
    mbrd.mmu.set(0xffff, 0x01);
    mbrd.mmu.set(0xff40, 0x91);
    for _ in 0..20_000 {
        mbrd.next().unwrap();
        if mbrd.pc() == 0x0040 {
            break;
        }
    }
    assert_eq!(mbrd.pc(), 0x0040);
    assert_eq!(mbrd.mmu.get_word(0xdffc), 0xc000);
}

#[test]
fn oam_dma_feeds_sprites_from_work_ram() {
    let mut mbrd = machine("dma", blank_rom(), nop_bootrom());
    // Stage one OAM entry in work RAM and trigger the burst.
    mbrd.mmu.set(0xc100, 16); // y
    mbrd.mmu.set(0xc101, 8); // x
    mbrd.mmu.set(0xc102, 0x01); // tile
    mbrd.mmu.set(0xc103, 0x00);
    mbrd.mmu.set(0xff46, 0xc1);
    assert_eq!(mbrd.mmu.get(0xfe00), 16);
    assert_eq!(mbrd.mmu.get(0xfe01), 8);
    assert_eq!(mbrd.mmu.get(0xfe02), 0x01);
}

#[test]
fn unknown_opcode_aborts_the_run() {
    let mut mbrd = machine("bad-opcode", blank_rom(), nop_bootrom());
    mbrd.mmu.set(0xc000, 0xd3);
    mbrd.cpu.reg.pc = 0xc000;
    assert!(mbrd.next().is_err());
}

#[test]
fn battery_ram_survives_a_power_cycle() {
    let mut rom = blank_rom();
    rom[0x0147] = 0x03; // MBC1 with battery RAM
    rom[0x0149] = 0x02; // one 8KB bank
    let rom_path = write_temp("battery.gb", &rom);
    let sav_path = rom_path.with_extension("bmo");
    let _ = std::fs::remove_file(&sav_path);

    let mut cart = cartridge::power_up(&rom_path).unwrap();
    cart.set(0x0000, 0x0a); // enable RAM
    cart.set(0xa000, 0x5a);
    cart.set(0xbfff, 0xa5);
    cart.sav();

    let mut cart = cartridge::power_up(&rom_path).unwrap();
    cart.set(0x0000, 0x0a);
    assert_eq!(cart.get(0xa000), 0x5a);
    assert_eq!(cart.get(0xbfff), 0xa5);
    let _ = std::fs::remove_file(&sav_path);
}
