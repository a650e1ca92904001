// The driver's root object: it owns the whole machine and runs the
// cpu -> ppu -> timer lock-step. Every instruction completes its memory side
// effects before its machine-cycle count is fed to the peripherals.
use super::cartridge;
use super::cpu::Cpu;
use super::error::Error;
use super::joypad::JoypadKey;
use super::mmu::Mmu;
use std::fs::File;
use std::io::Read;
use std::path::Path;

pub struct MotherBoard {
    pub mmu: Mmu,
    pub cpu: Cpu,
}

impl MotherBoard {
    pub fn power_up(rom_path: impl AsRef<Path>, bootrom_path: impl AsRef<Path>) -> Result<Self, Error> {
        let cart = cartridge::power_up(rom_path)?;
        let mut f = File::open(bootrom_path.as_ref())?;
        let mut bootrom = Vec::new();
        f.read_to_end(&mut bootrom)?;
        Ok(Self { mmu: Mmu::power_up(cart, bootrom)?, cpu: Cpu::power_up() })
    }

    pub fn next(&mut self) -> Result<u32, Error> {
        let cycles = self.cpu.next(&mut self.mmu)?;
        self.mmu.next(cycles);
        Ok(cycles)
    }

    pub fn pc(&self) -> u16 {
        self.cpu.reg.pc
    }

    // The framebuffer is only meaningful while the vblank latch is set; the
    // presenter copies it out and clears the latch.
    pub fn check_and_reset_vblank(&mut self) -> bool {
        let v = self.mmu.ppu.vblank;
        self.mmu.ppu.vblank = false;
        v
    }

    pub fn framebuffer(&self) -> &[u8] {
        &self.mmu.ppu.data
    }

    pub fn keydown(&mut self, key: JoypadKey) {
        self.mmu.joypad.set_key(key);
    }

    pub fn keyup(&mut self, key: JoypadKey) {
        self.mmu.joypad.reset_key(key);
    }

    pub fn title(&self) -> String {
        self.mmu.cartridge.title()
    }

    pub fn sav(&self) {
        self.mmu.cartridge.sav();
    }
}
