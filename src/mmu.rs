// The memory management unit routes every 16-bit bus access to the device
// that owns the address: cartridge, video RAM, work RAM, OAM, the I/O
// peripherals, and high RAM. It also carries the bootrom overlay and the
// OAM-DMA burst.
use super::apu::{Apu, APU_END, APU_START};
use super::cartridge::Cartridge;
use super::error::Error;
use super::intf::{Intf, INTE_ADDRESS, INTF_ADDRESS};
use super::joypad::{Joypad, P1};
use super::memory::Memory;
use super::ppu::{Ppu, DMA, LCDC, WX};
use super::timer::{Timer, DIV, TAC};
use std::cell::RefCell;
use std::rc::Rc;

pub const BOOTROM_SIZE: usize = 0x100;
pub const BOOTROM_DISABLE: u16 = 0xff50;

pub struct Mmu {
    pub cartridge: Box<dyn Cartridge>,
    pub apu: Apu,
    pub ppu: Ppu,
    pub joypad: Joypad,
    pub timer: Timer,
    pub intf: Rc<RefCell<Intf>>,

    // The 256-byte bootrom shadows the cartridge at 0x0000-0x00ff until the
    // program writes a nonzero value to the disable latch. The overlay never
    // comes back.
    bootrom: [u8; BOOTROM_SIZE],
    bootrom_disabled: bool,

    wram: [u8; 0x2000],
    hram: [u8; 0x7f],
    // Backing store for I/O ports no peripheral claims.
    io: [u8; 0x80],
}

impl Mmu {
    pub fn power_up(cartridge: Box<dyn Cartridge>, bootrom: Vec<u8>) -> Result<Self, Error> {
        if bootrom.len() != BOOTROM_SIZE {
            return Err(Error::InvalidBootrom(bootrom.len()));
        }
        let intf = Rc::new(RefCell::new(Intf::power_up()));
        let mut r = Self {
            cartridge,
            apu: Apu::power_up(),
            ppu: Ppu::power_up(intf.clone()),
            joypad: Joypad::power_up(intf.clone()),
            timer: Timer::power_up(intf.clone()),
            intf,
            bootrom: [0x00; BOOTROM_SIZE],
            bootrom_disabled: false,
            wram: [0x00; 0x2000],
            hram: [0x00; 0x7f],
            io: [0x00; 0x80],
        };
        r.bootrom.copy_from_slice(&bootrom);
        Ok(r)
    }

    // Clock the peripherals with the machine cycles the CPU just consumed.
    // The PPU advances before the timer.
    pub fn next(&mut self, cycles: u32) {
        self.ppu.next(cycles);
        self.timer.next(cycles);
    }

    // A write to the DMA register copies 160 bytes from source << 8 into
    // OAM through ordinary bus accesses. Real hardware spreads the burst
    // over 160 machine cycles; this core copies at once.
    fn run_dma(&mut self, source: u8) {
        let base = u16::from(source) << 8;
        for i in 0..0xa0 {
            let b = self.get(base + i);
            self.set(0xfe00 + i, b);
        }
    }
}

impl Memory for Mmu {
    fn get(&self, a: u16) -> u8 {
        match a {
            0x0000..=0x00ff => {
                if self.bootrom_disabled {
                    self.cartridge.get(a)
                } else {
                    self.bootrom[a as usize]
                }
            }
            0x0100..=0x7fff => self.cartridge.get(a),
            0x8000..=0x9fff => self.ppu.get(a),
            0xa000..=0xbfff => self.cartridge.get(a),
            0xc000..=0xdfff => self.wram[a as usize - 0xc000],
            0xfe00..=0xfe9f => self.ppu.get(a),
            P1 => self.joypad.get(a),
            DIV..=TAC => self.timer.get(a),
            INTF_ADDRESS => self.intf.borrow().request,
            APU_START..=APU_END => self.apu.get(a),
            LCDC..=WX => self.ppu.get(a),
            BOOTROM_DISABLE => u8::from(self.bootrom_disabled),
            0xff00..=0xff7f => self.io[a as usize - 0xff00],
            0xff80..=0xfffe => self.hram[a as usize - 0xff80],
            INTE_ADDRESS => self.intf.borrow().enable,
            _ => 0x00,
        }
    }

    fn set(&mut self, a: u16, v: u8) {
        match a {
            0x0000..=0x7fff => self.cartridge.set(a, v),
            0x8000..=0x9fff => self.ppu.set(a, v),
            0xa000..=0xbfff => self.cartridge.set(a, v),
            0xc000..=0xdfff => self.wram[a as usize - 0xc000] = v,
            0xfe00..=0xfe9f => self.ppu.set(a, v),
            P1 => self.joypad.set(a, v),
            DIV..=TAC => self.timer.set(a, v),
            INTF_ADDRESS => self.intf.borrow_mut().request = v,
            APU_START..=APU_END => self.apu.set(a, v),
            DMA => {
                self.ppu.set(a, v);
                self.run_dma(v);
            }
            LCDC..=WX => self.ppu.set(a, v),
            BOOTROM_DISABLE => {
                if v != 0x00 {
                    self.bootrom_disabled = true;
                }
            }
            0xff00..=0xff7f => self.io[a as usize - 0xff00] = v,
            0xff80..=0xfffe => self.hram[a as usize - 0xff80] = v,
            INTE_ADDRESS => self.intf.borrow_mut().enable = v,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::cartridge;
    use super::*;

    fn mmu() -> Mmu {
        let mut rom = vec![0x00; 0x8000];
        rom[0x0147] = 0x00;
        for i in 0..0x100 {
            rom[i] = 0xc0 | (i as u8 & 0x0f);
        }
        let cart = cartridge::new_cartridge(rom, "").unwrap();
        let mut bootrom = vec![0x00; BOOTROM_SIZE];
        for (i, b) in bootrom.iter_mut().enumerate() {
            *b = i as u8;
        }
        Mmu::power_up(cart, bootrom).unwrap()
    }

    #[test]
    fn bootrom_must_be_256_bytes() {
        let cart = cartridge::new_cartridge(vec![0x00; 0x8000], "").unwrap();
        assert!(Mmu::power_up(cart, vec![0x00; 0xff]).is_err());
    }

    #[test]
    fn bootrom_overlay_and_disable_latch() {
        let mut m = mmu();
        assert_eq!(m.get(0x0000), 0x00);
        assert_eq!(m.get(0x00ff), 0xff);
        assert_eq!(m.get(BOOTROM_DISABLE), 0x00);
        // Any nonzero write disables the overlay for good.
        m.set(BOOTROM_DISABLE, 0x11);
        assert_eq!(m.get(0x0000), 0xc0);
        assert_eq!(m.get(BOOTROM_DISABLE), 0x01);
        m.set(BOOTROM_DISABLE, 0x00);
        assert_eq!(m.get(0x0000), 0xc0);
    }

    #[test]
    fn words_are_little_endian() {
        let mut m = mmu();
        m.set_word(0xc000, 0xbeef);
        assert_eq!(m.get(0xc000), 0xef);
        assert_eq!(m.get(0xc001), 0xbe);
        assert_eq!(m.get_word(0xc000), 0xbeef);
    }

    #[test]
    fn dma_copies_160_bytes_to_oam() {
        let mut m = mmu();
        for i in 0..0xa0 {
            m.set(0xc000 + i, i as u8);
        }
        m.set(DMA, 0xc0);
        for i in 0..0xa0 {
            assert_eq!(m.get(0xfe00 + i), i as u8);
        }
        assert_eq!(m.get(DMA), 0xc0);
    }

    #[test]
    fn interrupt_registers_route_to_the_controller() {
        let mut m = mmu();
        m.set(INTE_ADDRESS, 0x1f);
        m.set(INTF_ADDRESS, 0x04);
        assert_eq!(m.intf.borrow().enable, 0x1f);
        assert_eq!(m.intf.borrow().pending(), Some(2));
        assert_eq!(m.get(INTF_ADDRESS), 0x04);
    }

    #[test]
    fn unmapped_addresses_read_zero() {
        let mut m = mmu();
        assert_eq!(m.get(0xfea0), 0x00);
        assert_eq!(m.get(0xe000), 0x00);
        m.set(0xfea0, 0xff);
        assert_eq!(m.get(0xfea0), 0x00);
    }

    #[test]
    fn unclaimed_io_backs_to_flat_storage() {
        let mut m = mmu();
        m.set(0xff01, 0xab); // serial data, unclaimed in this core
        assert_eq!(m.get(0xff01), 0xab);
    }

    #[test]
    fn hram_round_trip() {
        let mut m = mmu();
        m.set(0xff80, 0x12);
        m.set(0xfffe, 0x34);
        assert_eq!(m.get(0xff80), 0x12);
        assert_eq!(m.get(0xfffe), 0x34);
    }
}
