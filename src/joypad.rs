// The eight buttons/direction keys are arranged as a 2x4 matrix. A program
// selects either the button or the direction half by writing to P1, then
// reads the key states from bits 0-3.
//
// FF00 - P1/JOYP - Joypad (R/W)
//
// Bit 5 - P15 Select Button Keys      (0=Select)
// Bit 4 - P14 Select Direction Keys   (0=Select)
// Bit 3 - P13 Input Down  or Start    (0=Pressed) (Read Only)
// Bit 2 - P12 Input Up    or Select   (0=Pressed) (Read Only)
// Bit 1 - P11 Input Left  or Button B (0=Pressed) (Read Only)
// Bit 0 - P10 Input Right or Button A (0=Pressed) (Read Only)
use super::intf::{Flag, Intf};
use super::memory::Memory;
use std::cell::RefCell;
use std::rc::Rc;

pub const P1: u16 = 0xff00;

const DIRECTION_SELECT: u8 = 1 << 4;
const BUTTON_SELECT: u8 = 1 << 5;

// The low two bits of a key code index the bit within its 4-bit half; codes
// 0-3 live in the direction half, 4-7 in the button half.
#[rustfmt::skip]
#[derive(Clone, Copy)]
pub enum JoypadKey {
    Right  = 0,
    Left   = 1,
    Up     = 2,
    Down   = 3,
    A      = 4,
    B      = 5,
    Select = 6,
    Start  = 7,
}

pub struct Joypad {
    intf: Rc<RefCell<Intf>>,

    // Last written select bits (4-5); the input bits are derived on read.
    p1: u8,

    // Shadow key states, one nibble per matrix half. Bit clear = pressed.
    direction: u8,
    button: u8,
}

impl Joypad {
    pub fn power_up(intf: Rc<RefCell<Intf>>) -> Self {
        Self { intf, p1: 0x00, direction: 0x0f, button: 0x0f }
    }

    pub fn set_key(&mut self, key: JoypadKey) {
        let code = key as u8;
        *self.state(code) &= !(1 << (code % 4));
    }

    pub fn reset_key(&mut self, key: JoypadKey) {
        let code = key as u8;
        *self.state(code) |= 1 << (code % 4);
        self.intf.borrow_mut().hi(Flag::Joypad);
    }

    fn state(&mut self, code: u8) -> &mut u8 {
        if code <= 3 {
            &mut self.direction
        } else {
            &mut self.button
        }
    }

    fn selected(&self) -> Option<u8> {
        if self.p1 & DIRECTION_SELECT == 0x00 {
            Some(self.direction)
        } else if self.p1 & BUTTON_SELECT == 0x00 {
            Some(self.button)
        } else {
            None
        }
    }
}

impl Memory for Joypad {
    fn get(&self, a: u16) -> u8 {
        if a != P1 {
            return 0x00;
        }
        match self.selected() {
            Some(state) => self.p1 | state,
            None => self.p1,
        }
    }

    // Only the two select lines are writable; bits 0-3 are input lines.
    fn set(&mut self, a: u16, v: u8) {
        if a == P1 {
            self.p1 = v & 0x30;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joypad() -> (Joypad, Rc<RefCell<Intf>>) {
        let intf = Rc::new(RefCell::new(Intf::power_up()));
        (Joypad::power_up(intf.clone()), intf)
    }

    #[test]
    fn press_and_release_right() {
        let (mut j, intf) = joypad();
        j.set(P1, 0x00); // direction line low
        j.set_key(JoypadKey::Right);
        assert_eq!(j.get(P1), 0x0e);
        j.reset_key(JoypadKey::Right);
        assert_eq!(j.get(P1), 0x0f);
        // The joypad interrupt fires on release.
        assert_eq!(intf.borrow().request, 1 << Flag::Joypad as u8);
    }

    #[test]
    fn select_lines_pick_the_matrix_half() {
        let (mut j, _intf) = joypad();
        j.set_key(JoypadKey::Start);
        j.set(P1, 0x10); // button line low, direction high
        assert_eq!(j.get(P1), 0x10 | 0x07);
        j.set(P1, 0x20); // direction line low, button high
        assert_eq!(j.get(P1), 0x20 | 0x0f);
    }

    #[test]
    fn writes_keep_only_select_bits() {
        let (mut j, _intf) = joypad();
        j.set(P1, 0xff);
        assert_eq!(j.p1, 0x30);
        assert_eq!(j.get(P1), 0x30);
    }
}
