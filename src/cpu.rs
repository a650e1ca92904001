// The 8-bit CPU: a Z80/8080 hybrid with eight one-byte registers and a
// 16-bit address space. Each step services a pending interrupt or executes
// one instruction, and returns the cost in machine cycles (4 clocks each).
use super::error::Error;
use super::intf::{INTE_ADDRESS, INTF_ADDRESS};
use super::memory::Memory;
use super::register::Flag::{C, H, N, Z};
use super::register::Register;
use std::fmt;

// Base machine-cycle cost per opcode. Conditional branches pay a surcharge
// on top when taken: JR/JP +1, CALL/RET +3.
//  0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f
const OP_CYCLES: [u32; 256] = [
    1, 3, 2, 2, 1, 1, 2, 1, 5, 2, 2, 2, 1, 1, 2, 1, // 0
    1, 3, 2, 2, 1, 1, 2, 1, 3, 2, 2, 2, 1, 1, 2, 1, // 1
    2, 3, 2, 2, 1, 1, 2, 1, 2, 2, 2, 2, 1, 1, 2, 1, // 2
    2, 3, 2, 2, 3, 3, 3, 1, 2, 2, 2, 2, 1, 1, 2, 1, // 3
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 4
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 5
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 6
    2, 2, 2, 2, 2, 2, 1, 2, 1, 1, 1, 1, 1, 1, 2, 1, // 7
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 8
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // 9
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // a
    1, 1, 1, 1, 1, 1, 2, 1, 1, 1, 1, 1, 1, 1, 2, 1, // b
    2, 3, 3, 4, 3, 4, 2, 4, 2, 4, 3, 0, 3, 6, 2, 4, // c
    2, 3, 3, 0, 3, 4, 2, 4, 2, 4, 3, 0, 3, 0, 2, 4, // d
    3, 3, 2, 0, 0, 4, 2, 4, 4, 1, 4, 0, 0, 0, 2, 4, // e
    3, 3, 2, 1, 0, 4, 2, 4, 3, 2, 4, 1, 0, 0, 2, 4, // f
];

// Machine-cycle cost per CB-prefixed opcode, prefix fetch included.
//  0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f
const CB_CYCLES: [u32; 256] = [
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // 0
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // 1
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // 2
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // 3
    2, 2, 2, 2, 2, 2, 3, 2, 2, 2, 2, 2, 2, 2, 3, 2, // 4
    2, 2, 2, 2, 2, 2, 3, 2, 2, 2, 2, 2, 2, 2, 3, 2, // 5
    2, 2, 2, 2, 2, 2, 3, 2, 2, 2, 2, 2, 2, 2, 3, 2, // 6
    2, 2, 2, 2, 2, 2, 3, 2, 2, 2, 2, 2, 2, 2, 3, 2, // 7
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // 8
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // 9
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // a
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // b
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // c
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // d
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // e
    2, 2, 2, 2, 2, 2, 4, 2, 2, 2, 2, 2, 2, 2, 4, 2, // f
];

pub struct Cpu {
    pub reg: Register,
    pub halted: bool,
    pub ime: bool,
}

impl Cpu {
    pub fn power_up() -> Self {
        Self { reg: Register::power_up(), halted: false, ime: false }
    }

    // Service a pending interrupt or run one instruction, returning the
    // machine cycles consumed. Decoder failures are the only errors.
    pub fn next(&mut self, mem: &mut impl Memory) -> Result<u32, Error> {
        let c = self.handle_interrupts(mem);
        if c != 0 {
            return Ok(c);
        }
        if self.halted {
            return Ok(1);
        }
        self.ex(mem)
    }

    // A pending interrupt always leaves HALT, but is only dispatched when
    // the master enable is set: clear IME and the request bit, push PC and
    // jump to the source's vector. Dispatch costs 5 machine cycles.
    fn handle_interrupts(&mut self, mem: &mut impl Memory) -> u32 {
        if !self.ime && !self.halted {
            return 0;
        }
        let intf = mem.get(INTF_ADDRESS);
        let inte = mem.get(INTE_ADDRESS);
        let pending = intf & inte & 0x1f;
        if pending == 0x00 {
            return 0;
        }
        self.halted = false;
        if !self.ime {
            return 0;
        }
        self.ime = false;
        let n = pending.trailing_zeros() as u16;
        mem.set(INTF_ADDRESS, intf & !(1 << n));
        self.stack_add(mem, self.reg.pc);
        self.reg.pc = 0x0040 + (n << 3);
        5
    }
}

// Fetch and operand helpers.
impl Cpu {
    fn imm(&mut self, mem: &mut impl Memory) -> u8 {
        let v = mem.get(self.reg.pc);
        self.reg.pc = self.reg.pc.wrapping_add(1);
        v
    }

    fn imm_word(&mut self, mem: &mut impl Memory) -> u16 {
        let v = mem.get_word(self.reg.pc);
        self.reg.pc = self.reg.pc.wrapping_add(2);
        v
    }

    fn stack_add(&mut self, mem: &mut impl Memory, v: u16) {
        self.reg.sp = self.reg.sp.wrapping_sub(2);
        mem.set_word(self.reg.sp, v);
    }

    fn stack_pop(&mut self, mem: &mut impl Memory) -> u16 {
        let v = mem.get_word(self.reg.sp);
        self.reg.sp = self.reg.sp.wrapping_add(2);
        v
    }

    // The 3-bit register field of an opcode selects an 8-bit operand:
    // {0:B, 1:C, 2:D, 3:E, 4:H, 5:L, 6:(HL), 7:A}.
    fn operand(&mut self, mem: &mut impl Memory, r: u8) -> u8 {
        match r & 0x07 {
            0 => self.reg.b,
            1 => self.reg.c,
            2 => self.reg.d,
            3 => self.reg.e,
            4 => self.reg.h,
            5 => self.reg.l,
            6 => mem.get(self.reg.get_hl()),
            _ => self.reg.a,
        }
    }

    fn set_operand(&mut self, mem: &mut impl Memory, r: u8, v: u8) {
        match r & 0x07 {
            0 => self.reg.b = v,
            1 => self.reg.c = v,
            2 => self.reg.d = v,
            3 => self.reg.e = v,
            4 => self.reg.h = v,
            5 => self.reg.l = v,
            6 => mem.set(self.reg.get_hl(), v),
            _ => self.reg.a = v,
        }
    }

    // The 2-bit pair field selects a 16-bit operand: {0:BC, 1:DE, 2:HL,
    // 3:SP}. PUSH and POP replace SP with AF.
    fn get_rp(&self, i: u8) -> u16 {
        match i & 0x03 {
            0 => self.reg.get_bc(),
            1 => self.reg.get_de(),
            2 => self.reg.get_hl(),
            _ => self.reg.sp,
        }
    }

    fn set_rp(&mut self, i: u8, v: u16) {
        match i & 0x03 {
            0 => self.reg.set_bc(v),
            1 => self.reg.set_de(v),
            2 => self.reg.set_hl(v),
            _ => self.reg.sp = v,
        }
    }

    fn get_rp_af(&self, i: u8) -> u16 {
        match i & 0x03 {
            0 => self.reg.get_bc(),
            1 => self.reg.get_de(),
            2 => self.reg.get_hl(),
            _ => self.reg.get_af(),
        }
    }

    fn set_rp_af(&mut self, i: u8, v: u16) {
        match i & 0x03 {
            0 => self.reg.set_bc(v),
            1 => self.reg.set_de(v),
            2 => self.reg.set_hl(v),
            _ => self.reg.set_af(v),
        }
    }

    // The 2-bit condition field: {0:NZ, 1:Z, 2:NC, 3:C}.
    fn condition(&self, i: u8) -> bool {
        match i & 0x03 {
            0 => !self.reg.get_flag(Z),
            1 => self.reg.get_flag(Z),
            2 => !self.reg.get_flag(C),
            _ => self.reg.get_flag(C),
        }
    }
}

// The arithmetic and logic unit. Each helper applies the documented flag
// effects and returns the result where there is one.
impl Cpu {
    // Z - set if result is zero. N - reset.
    // H - carry from bit 3. C - carry from bit 7.
    fn alu_add(&mut self, n: u8) {
        let a = self.reg.a;
        let r = a.wrapping_add(n);
        self.reg.set_flag(C, u16::from(a) + u16::from(n) > 0xff);
        self.reg.set_flag(H, (a & 0x0f) + (n & 0x0f) > 0x0f);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    // Add with the carry flag included on both the 4-bit and 8-bit carries.
    fn alu_adc(&mut self, n: u8) {
        let a = self.reg.a;
        let c = u8::from(self.reg.get_flag(C));
        let r = a.wrapping_add(n).wrapping_add(c);
        self.reg.set_flag(C, u16::from(a) + u16::from(n) + u16::from(c) > 0xff);
        self.reg.set_flag(H, (a & 0x0f) + (n & 0x0f) + c > 0x0f);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    // Z - set if result is zero. N - set.
    // H - borrow from bit 4. C - borrow.
    fn alu_sub(&mut self, n: u8) {
        let a = self.reg.a;
        let r = a.wrapping_sub(n);
        self.reg.set_flag(C, a < n);
        self.reg.set_flag(H, (a & 0x0f) < (n & 0x0f));
        self.reg.set_flag(N, true);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    fn alu_sbc(&mut self, n: u8) {
        let a = self.reg.a;
        let c = u8::from(self.reg.get_flag(C));
        let r = a.wrapping_sub(n).wrapping_sub(c);
        self.reg.set_flag(C, u16::from(a) < u16::from(n) + u16::from(c));
        self.reg.set_flag(H, (a & 0x0f) < (n & 0x0f) + c);
        self.reg.set_flag(N, true);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    // Z per result, H set, N and C reset.
    fn alu_and(&mut self, n: u8) {
        let r = self.reg.a & n;
        self.reg.set_flag(C, false);
        self.reg.set_flag(H, true);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    // Z per result, N, H and C reset.
    fn alu_xor(&mut self, n: u8) {
        let r = self.reg.a ^ n;
        self.reg.set_flag(C, false);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    fn alu_or(&mut self, n: u8) {
        let r = self.reg.a | n;
        self.reg.set_flag(C, false);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        self.reg.a = r;
    }

    // A - n with the result thrown away.
    fn alu_cp(&mut self, n: u8) {
        let a = self.reg.a;
        self.alu_sub(n);
        self.reg.a = a;
    }

    // C is not affected.
    fn alu_inc(&mut self, a: u8) -> u8 {
        let r = a.wrapping_add(1);
        self.reg.set_flag(H, r & 0x0f == 0x00);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    // C is not affected.
    fn alu_dec(&mut self, a: u8) -> u8 {
        let r = a.wrapping_sub(1);
        self.reg.set_flag(H, r & 0x0f == 0x0f);
        self.reg.set_flag(N, true);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    // 16-bit add into HL. Z is not affected; the half carry is taken at the
    // 12-bit boundary.
    fn alu_add_hl(&mut self, n: u16) {
        let a = self.reg.get_hl();
        let r = a.wrapping_add(n);
        self.reg.set_flag(C, a > 0xffff - n);
        self.reg.set_flag(H, (a & 0x0fff) + (n & 0x0fff) > 0x0fff);
        self.reg.set_flag(N, false);
        self.reg.set_hl(r);
    }

    // SP plus a signed immediate, shared by ADD SP,i8 and LD HL,SP+i8.
    // Z and N are reset; H and C come from the low-byte addition.
    fn alu_add_sp(&mut self, mem: &mut impl Memory) -> u16 {
        let a = self.reg.sp;
        let b = i16::from(self.imm(mem) as i8) as u16;
        self.reg.set_flag(C, (a & 0x00ff) + (b & 0x00ff) > 0x00ff);
        self.reg.set_flag(H, (a & 0x000f) + (b & 0x000f) > 0x000f);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, false);
        a.wrapping_add(b)
    }

    // Binary coded decimal correction of A after an addition or subtraction.
    fn alu_daa(&mut self) {
        let mut a = self.reg.a;
        let mut adjust = if self.reg.get_flag(C) { 0x60 } else { 0x00 };
        if self.reg.get_flag(H) {
            adjust |= 0x06;
        }
        if !self.reg.get_flag(N) {
            if a & 0x0f > 0x09 {
                adjust |= 0x06;
            }
            if a > 0x99 {
                adjust |= 0x60;
            }
            a = a.wrapping_add(adjust);
        } else {
            a = a.wrapping_sub(adjust);
        }
        self.reg.set_flag(C, adjust >= 0x60);
        self.reg.set_flag(H, false);
        self.reg.set_flag(Z, a == 0x00);
        self.reg.a = a;
    }

    fn alu_cpl(&mut self) {
        self.reg.a = !self.reg.a;
        self.reg.set_flag(H, true);
        self.reg.set_flag(N, true);
    }

    fn alu_ccf(&mut self) {
        let v = !self.reg.get_flag(C);
        self.reg.set_flag(C, v);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
    }

    fn alu_scf(&mut self) {
        self.reg.set_flag(C, true);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
    }

    // Rotates and shifts all clear N and H, put the bit shifted out into C
    // and set Z per the result.
    fn alu_rlc(&mut self, a: u8) -> u8 {
        let c = a & 0x80 != 0x00;
        let r = (a << 1) | u8::from(c);
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_rl(&mut self, a: u8) -> u8 {
        let c = a & 0x80 != 0x00;
        let r = (a << 1) | u8::from(self.reg.get_flag(C));
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_rrc(&mut self, a: u8) -> u8 {
        let c = a & 0x01 != 0x00;
        let r = (a >> 1) | (u8::from(c) << 7);
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_rr(&mut self, a: u8) -> u8 {
        let c = a & 0x01 != 0x00;
        let r = (a >> 1) | (u8::from(self.reg.get_flag(C)) << 7);
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_sla(&mut self, a: u8) -> u8 {
        let c = a & 0x80 != 0x00;
        let r = a << 1;
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    // Arithmetic shift right: the sign bit is kept.
    fn alu_sra(&mut self, a: u8) -> u8 {
        let c = a & 0x01 != 0x00;
        let r = (a >> 1) | (a & 0x80);
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_srl(&mut self, a: u8) -> u8 {
        let c = a & 0x01 != 0x00;
        let r = a >> 1;
        self.reg.set_flag(C, c);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, r == 0x00);
        r
    }

    fn alu_swap(&mut self, a: u8) -> u8 {
        self.reg.set_flag(C, false);
        self.reg.set_flag(H, false);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, a == 0x00);
        (a >> 4) | (a << 4)
    }

    // Z is set when the tested bit is clear; C is not affected.
    fn alu_bit(&mut self, a: u8, b: u8) {
        self.reg.set_flag(H, true);
        self.reg.set_flag(N, false);
        self.reg.set_flag(Z, a & (1 << b) == 0x00);
    }

    // Relative jump by the signed immediate at PC.
    fn alu_jr(&mut self, mem: &mut impl Memory) {
        let n = self.imm(mem) as i8;
        self.reg.pc = (i32::from(self.reg.pc) + i32::from(n)) as u16;
    }

    // Shared dispatch for the eight accumulator operations, selected by the
    // opcode's bits 5-3: {0:ADD, 1:ADC, 2:SUB, 3:SBC, 4:AND, 5:XOR, 6:OR,
    // 7:CP}.
    fn alu_acc(&mut self, op: u8, v: u8) {
        match op & 0x07 {
            0 => self.alu_add(v),
            1 => self.alu_adc(v),
            2 => self.alu_sub(v),
            3 => self.alu_sbc(v),
            4 => self.alu_and(v),
            5 => self.alu_xor(v),
            6 => self.alu_or(v),
            _ => self.alu_cp(v),
        }
    }
}

impl Cpu {
    fn ex(&mut self, mem: &mut impl Memory) -> Result<u32, Error> {
        let opcode = self.imm(mem);
        let mut ecycle = 0;
        match opcode {
            // The CB prefix selects the second dispatch table.
            0xcb => {
                let cbcode = self.imm(mem);
                self.ex_cb(mem, cbcode)?;
                return Ok(CB_CYCLES[cbcode as usize]);
            }
            // NOP
            0x00 => {}
            // LD rr, nn
            0x01 | 0x11 | 0x21 | 0x31 => {
                let v = self.imm_word(mem);
                self.set_rp(opcode >> 4, v);
            }
            // LD (BC), A / LD (DE), A
            0x02 => mem.set(self.reg.get_bc(), self.reg.a),
            0x12 => mem.set(self.reg.get_de(), self.reg.a),
            // INC rr / DEC rr, no flags affected
            0x03 | 0x13 | 0x23 | 0x33 => {
                let i = opcode >> 4;
                let v = self.get_rp(i).wrapping_add(1);
                self.set_rp(i, v);
            }
            0x0b | 0x1b | 0x2b | 0x3b => {
                let i = opcode >> 4;
                let v = self.get_rp(i).wrapping_sub(1);
                self.set_rp(i, v);
            }
            // INC r
            0x04 | 0x0c | 0x14 | 0x1c | 0x24 | 0x2c | 0x34 | 0x3c => {
                let r = opcode >> 3;
                let v = self.operand(mem, r);
                let v = self.alu_inc(v);
                self.set_operand(mem, r, v);
            }
            // DEC r
            0x05 | 0x0d | 0x15 | 0x1d | 0x25 | 0x2d | 0x35 | 0x3d => {
                let r = opcode >> 3;
                let v = self.operand(mem, r);
                let v = self.alu_dec(v);
                self.set_operand(mem, r, v);
            }
            // LD r, n
            0x06 | 0x0e | 0x16 | 0x1e | 0x26 | 0x2e | 0x36 | 0x3e => {
                let v = self.imm(mem);
                self.set_operand(mem, opcode >> 3, v);
            }
            // The accumulator rotates clear Z, unlike their CB forms.
            0x07 => {
                self.reg.a = self.alu_rlc(self.reg.a);
                self.reg.set_flag(Z, false);
            }
            0x0f => {
                self.reg.a = self.alu_rrc(self.reg.a);
                self.reg.set_flag(Z, false);
            }
            0x17 => {
                self.reg.a = self.alu_rl(self.reg.a);
                self.reg.set_flag(Z, false);
            }
            0x1f => {
                self.reg.a = self.alu_rr(self.reg.a);
                self.reg.set_flag(Z, false);
            }
            // LD (nn), SP
            0x08 => {
                let a = self.imm_word(mem);
                mem.set_word(a, self.reg.sp);
            }
            // ADD HL, rr
            0x09 | 0x19 | 0x29 | 0x39 => self.alu_add_hl(self.get_rp(opcode >> 4)),
            // LD A, (BC) / LD A, (DE)
            0x0a => self.reg.a = mem.get(self.reg.get_bc()),
            0x1a => self.reg.a = mem.get(self.reg.get_de()),
            // STOP reads and discards its operand byte.
            0x10 => {
                self.imm(mem);
            }
            // JR n
            0x18 => self.alu_jr(mem),
            // JR cc, n
            0x20 | 0x28 | 0x30 | 0x38 => {
                if self.condition(opcode >> 3) {
                    self.alu_jr(mem);
                    ecycle = 1;
                } else {
                    self.reg.pc = self.reg.pc.wrapping_add(1);
                }
            }
            // LDI / LDD through HL
            0x22 => {
                let a = self.reg.get_hl();
                mem.set(a, self.reg.a);
                self.reg.set_hl(a.wrapping_add(1));
            }
            0x2a => {
                let a = self.reg.get_hl();
                self.reg.a = mem.get(a);
                self.reg.set_hl(a.wrapping_add(1));
            }
            0x32 => {
                let a = self.reg.get_hl();
                mem.set(a, self.reg.a);
                self.reg.set_hl(a.wrapping_sub(1));
            }
            0x3a => {
                let a = self.reg.get_hl();
                self.reg.a = mem.get(a);
                self.reg.set_hl(a.wrapping_sub(1));
            }
            0x27 => self.alu_daa(),
            0x2f => self.alu_cpl(),
            0x37 => self.alu_scf(),
            0x3f => self.alu_ccf(),
            // HALT suspends execution until an interrupt is pending.
            0x76 => self.halted = true,
            // LD r, r'
            0x40..=0x7f => {
                let v = self.operand(mem, opcode);
                self.set_operand(mem, opcode >> 3, v);
            }
            // The accumulator ALU quadrant
            0x80..=0xbf => {
                let v = self.operand(mem, opcode);
                self.alu_acc(opcode >> 3, v);
            }
            // RET cc
            0xc0 | 0xc8 | 0xd0 | 0xd8 => {
                if self.condition(opcode >> 3) {
                    self.reg.pc = self.stack_pop(mem);
                    ecycle = 3;
                }
            }
            // POP rr (AF in slot 3, with F's low nibble masked)
            0xc1 | 0xd1 | 0xe1 | 0xf1 => {
                let v = self.stack_pop(mem);
                self.set_rp_af(opcode >> 4, v);
            }
            // JP cc, nn
            0xc2 | 0xca | 0xd2 | 0xda => {
                let pc = self.imm_word(mem);
                if self.condition(opcode >> 3) {
                    self.reg.pc = pc;
                    ecycle = 1;
                }
            }
            // JP nn
            0xc3 => self.reg.pc = self.imm_word(mem),
            // CALL cc, nn
            0xc4 | 0xcc | 0xd4 | 0xdc => {
                let nn = self.imm_word(mem);
                if self.condition(opcode >> 3) {
                    self.stack_add(mem, self.reg.pc);
                    self.reg.pc = nn;
                    ecycle = 3;
                }
            }
            // PUSH rr
            0xc5 | 0xd5 | 0xe5 | 0xf5 => {
                let v = self.get_rp_af(opcode >> 4);
                self.stack_add(mem, v);
            }
            // ALU A, n
            0xc6 | 0xce | 0xd6 | 0xde | 0xe6 | 0xee | 0xf6 | 0xfe => {
                let v = self.imm(mem);
                self.alu_acc(opcode >> 3, v);
            }
            // RST: push PC and jump to the fixed vector in bits 5-3.
            0xc7 | 0xcf | 0xd7 | 0xdf | 0xe7 | 0xef | 0xf7 | 0xff => {
                self.stack_add(mem, self.reg.pc);
                self.reg.pc = u16::from(opcode & 0x38);
            }
            // RET / RETI
            0xc9 => self.reg.pc = self.stack_pop(mem),
            0xd9 => {
                self.reg.pc = self.stack_pop(mem);
                self.ime = true;
            }
            // CALL nn
            0xcd => {
                let nn = self.imm_word(mem);
                self.stack_add(mem, self.reg.pc);
                self.reg.pc = nn;
            }
            // LDH (n), A / LDH A, (n)
            0xe0 => {
                let a = 0xff00 | u16::from(self.imm(mem));
                mem.set(a, self.reg.a);
            }
            0xf0 => {
                let a = 0xff00 | u16::from(self.imm(mem));
                self.reg.a = mem.get(a);
            }
            // LD (C), A / LD A, (C)
            0xe2 => mem.set(0xff00 | u16::from(self.reg.c), self.reg.a),
            0xf2 => self.reg.a = mem.get(0xff00 | u16::from(self.reg.c)),
            // ADD SP, i8 / LD HL, SP + i8
            0xe8 => self.reg.sp = self.alu_add_sp(mem),
            0xf8 => {
                let v = self.alu_add_sp(mem);
                self.reg.set_hl(v);
            }
            // JP (HL) / LD SP, HL
            0xe9 => self.reg.pc = self.reg.get_hl(),
            0xf9 => self.reg.sp = self.reg.get_hl(),
            // LD (nn), A / LD A, (nn)
            0xea => {
                let a = self.imm_word(mem);
                mem.set(a, self.reg.a);
            }
            0xfa => {
                let a = self.imm_word(mem);
                self.reg.a = mem.get(a);
            }
            // DI / EI. EI takes effect immediately in this core.
            0xf3 => self.ime = false,
            0xfb => self.ime = true,
            // The eleven holes in the opcode map: 0xd3, 0xdb, 0xdd, 0xe3,
            // 0xe4, 0xeb, 0xec, 0xed, 0xf4, 0xfc and 0xfd.
            _ => return Err(Error::UnknownOpcode(opcode)),
        }
        Ok(OP_CYCLES[opcode as usize] + ecycle)
    }

    // The CB page is regular: bits 7-6 pick the group, bits 5-3 the
    // operation or bit number, bits 2-0 the operand.
    fn ex_cb(&mut self, mem: &mut impl Memory, cbcode: u8) -> Result<(), Error> {
        match cbcode >> 3 {
            0x00 => {
                let v = self.operand(mem, cbcode);
                let v = self.alu_rlc(v);
                self.set_operand(mem, cbcode, v);
            }
            0x01 => {
                let v = self.operand(mem, cbcode);
                let v = self.alu_rrc(v);
                self.set_operand(mem, cbcode, v);
            }
            0x02 => {
                let v = self.operand(mem, cbcode);
                let v = self.alu_rl(v);
                self.set_operand(mem, cbcode, v);
            }
            0x03 => {
                let v = self.operand(mem, cbcode);
                let v = self.alu_rr(v);
                self.set_operand(mem, cbcode, v);
            }
            0x04 => {
                let v = self.operand(mem, cbcode);
                let v = self.alu_sla(v);
                self.set_operand(mem, cbcode, v);
            }
            0x05 => {
                let v = self.operand(mem, cbcode);
                let v = self.alu_sra(v);
                self.set_operand(mem, cbcode, v);
            }
            0x06 => {
                let v = self.operand(mem, cbcode);
                let v = self.alu_swap(v);
                self.set_operand(mem, cbcode, v);
            }
            0x07 => {
                let v = self.operand(mem, cbcode);
                let v = self.alu_srl(v);
                self.set_operand(mem, cbcode, v);
            }
            // BIT b, r reads only.
            0x08..=0x0f => {
                let v = self.operand(mem, cbcode);
                self.alu_bit(v, (cbcode >> 3) & 0x07);
            }
            // RES b, r
            0x10..=0x17 => {
                let v = self.operand(mem, cbcode) & !(1 << ((cbcode >> 3) & 0x07));
                self.set_operand(mem, cbcode, v);
            }
            // SET b, r
            0x18..=0x1f => {
                let v = self.operand(mem, cbcode) | (1 << ((cbcode >> 3) & 0x07));
                self.set_operand(mem, cbcode, v);
            }
            _ => return Err(Error::UnknownPrefixOpcode(cbcode)),
        }
        Ok(())
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "AF={:04x} BC={:04x} DE={:04x} HL={:04x} SP={:04x} PC={:04x} IME={} HALT={}",
            self.reg.get_af(),
            self.reg.get_bc(),
            self.reg.get_de(),
            self.reg.get_hl(),
            self.reg.sp,
            self.reg.pc,
            u8::from(self.ime),
            u8::from(self.halted),
        )
    }
}
