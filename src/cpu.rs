use crate::bus::Bus;
use crate::consts::{INTV_ADDR, NMIV_ADDR, RESV_ADDR, STACK_ADDR};
use bitflags::bitflags;
use log::{error, trace};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct StatusFlags: u8 {
        const N = 0b10000000; // 80
        const V = 0b01000000; // 40
        const U = 0b00100000; // 20, reads as 1 when pushed
        const B = 0b00010000; // 10
        const D = 0b00001000; // 08
        const I = 0b00000100; // 04
        const Z = 0b00000010; // 02
        const C = 0b00000001; // 01
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs,
    Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx,
    Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp,
    Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay,
    Tsx, Txa, Txs, Tya,
}

#[derive(Clone, Copy, Debug)]
pub struct Instruction {
    pub op: Op,
    pub mode: AddrMode,
}

const fn instr(op: Op, mode: AddrMode) -> Option<Instruction> {
    Some(Instruction { op, mode })
}

/// The documented opcodes, one slot per opcode byte. Undocumented slots
/// stay `None` and are reported at decode time.
pub static OPCODES: [Option<Instruction>; 256] = {
    use AddrMode::*;
    use Op::*;
    let mut t: [Option<Instruction>; 256] = [None; 256];

    t[0x00] = instr(Brk, Implied);
    t[0x01] = instr(Ora, IndirectX);
    t[0x05] = instr(Ora, ZeroPage);
    t[0x06] = instr(Asl, ZeroPage);
    t[0x08] = instr(Php, Implied);
    t[0x09] = instr(Ora, Immediate);
    t[0x0A] = instr(Asl, Accumulator);
    t[0x0D] = instr(Ora, Absolute);
    t[0x0E] = instr(Asl, Absolute);
    t[0x10] = instr(Bpl, Relative);
    t[0x11] = instr(Ora, IndirectY);
    t[0x15] = instr(Ora, ZeroPageX);
    t[0x16] = instr(Asl, ZeroPageX);
    t[0x18] = instr(Clc, Implied);
    t[0x19] = instr(Ora, AbsoluteY);
    t[0x1D] = instr(Ora, AbsoluteX);
    t[0x1E] = instr(Asl, AbsoluteX);
    t[0x20] = instr(Jsr, Absolute);
    t[0x21] = instr(And, IndirectX);
    t[0x24] = instr(Bit, ZeroPage);
    t[0x25] = instr(And, ZeroPage);
    t[0x26] = instr(Rol, ZeroPage);
    t[0x28] = instr(Plp, Implied);
    t[0x29] = instr(And, Immediate);
    t[0x2A] = instr(Rol, Accumulator);
    t[0x2C] = instr(Bit, Absolute);
    t[0x2D] = instr(And, Absolute);
    t[0x2E] = instr(Rol, Absolute);
    t[0x30] = instr(Bmi, Relative);
    t[0x31] = instr(And, IndirectY);
    t[0x35] = instr(And, ZeroPageX);
    t[0x36] = instr(Rol, ZeroPageX);
    t[0x38] = instr(Sec, Implied);
    t[0x39] = instr(And, AbsoluteY);
    t[0x3D] = instr(And, AbsoluteX);
    t[0x3E] = instr(Rol, AbsoluteX);
    t[0x40] = instr(Rti, Implied);
    t[0x41] = instr(Eor, IndirectX);
    t[0x45] = instr(Eor, ZeroPage);
    t[0x46] = instr(Lsr, ZeroPage);
    t[0x48] = instr(Pha, Implied);
    t[0x49] = instr(Eor, Immediate);
    t[0x4A] = instr(Lsr, Accumulator);
    t[0x4C] = instr(Jmp, Absolute);
    t[0x4D] = instr(Eor, Absolute);
    t[0x4E] = instr(Lsr, Absolute);
    t[0x50] = instr(Bvc, Relative);
    t[0x51] = instr(Eor, IndirectY);
    t[0x55] = instr(Eor, ZeroPageX);
    t[0x56] = instr(Lsr, ZeroPageX);
    t[0x58] = instr(Cli, Implied);
    t[0x59] = instr(Eor, AbsoluteY);
    t[0x5D] = instr(Eor, AbsoluteX);
    t[0x5E] = instr(Lsr, AbsoluteX);
    t[0x60] = instr(Rts, Implied);
    t[0x61] = instr(Adc, IndirectX);
    t[0x65] = instr(Adc, ZeroPage);
    t[0x66] = instr(Ror, ZeroPage);
    t[0x68] = instr(Pla, Implied);
    t[0x69] = instr(Adc, Immediate);
    t[0x6A] = instr(Ror, Accumulator);
    t[0x6C] = instr(Jmp, Indirect);
    t[0x6D] = instr(Adc, Absolute);
    t[0x6E] = instr(Ror, Absolute);
    t[0x70] = instr(Bvs, Relative);
    t[0x71] = instr(Adc, IndirectY);
    t[0x75] = instr(Adc, ZeroPageX);
    t[0x76] = instr(Ror, ZeroPageX);
    t[0x78] = instr(Sei, Implied);
    t[0x79] = instr(Adc, AbsoluteY);
    t[0x7D] = instr(Adc, AbsoluteX);
    t[0x7E] = instr(Ror, AbsoluteX);
    t[0x81] = instr(Sta, IndirectX);
    t[0x84] = instr(Sty, ZeroPage);
    t[0x85] = instr(Sta, ZeroPage);
    t[0x86] = instr(Stx, ZeroPage);
    t[0x88] = instr(Dey, Implied);
    t[0x8A] = instr(Txa, Implied);
    t[0x8C] = instr(Sty, Absolute);
    t[0x8D] = instr(Sta, Absolute);
    t[0x8E] = instr(Stx, Absolute);
    t[0x90] = instr(Bcc, Relative);
    t[0x91] = instr(Sta, IndirectY);
    t[0x94] = instr(Sty, ZeroPageX);
    t[0x95] = instr(Sta, ZeroPageX);
    t[0x96] = instr(Stx, ZeroPageY);
    t[0x98] = instr(Tya, Implied);
    t[0x99] = instr(Sta, AbsoluteY);
    t[0x9A] = instr(Txs, Implied);
    t[0x9D] = instr(Sta, AbsoluteX);
    t[0xA0] = instr(Ldy, Immediate);
    t[0xA1] = instr(Lda, IndirectX);
    t[0xA2] = instr(Ldx, Immediate);
    t[0xA4] = instr(Ldy, ZeroPage);
    t[0xA5] = instr(Lda, ZeroPage);
    t[0xA6] = instr(Ldx, ZeroPage);
    t[0xA8] = instr(Tay, Implied);
    t[0xA9] = instr(Lda, Immediate);
    t[0xAA] = instr(Tax, Implied);
    t[0xAC] = instr(Ldy, Absolute);
    t[0xAD] = instr(Lda, Absolute);
    t[0xAE] = instr(Ldx, Absolute);
    t[0xB0] = instr(Bcs, Relative);
    t[0xB1] = instr(Lda, IndirectY);
    t[0xB4] = instr(Ldy, ZeroPageX);
    t[0xB5] = instr(Lda, ZeroPageX);
    t[0xB6] = instr(Ldx, ZeroPageY);
    t[0xB8] = instr(Clv, Implied);
    t[0xB9] = instr(Lda, AbsoluteY);
    t[0xBA] = instr(Tsx, Implied);
    t[0xBC] = instr(Ldy, AbsoluteX);
    t[0xBD] = instr(Lda, AbsoluteX);
    t[0xBE] = instr(Ldx, AbsoluteY);
    t[0xC0] = instr(Cpy, Immediate);
    t[0xC1] = instr(Cmp, IndirectX);
    t[0xC4] = instr(Cpy, ZeroPage);
    t[0xC5] = instr(Cmp, ZeroPage);
    t[0xC6] = instr(Dec, ZeroPage);
    t[0xC8] = instr(Iny, Implied);
    t[0xC9] = instr(Cmp, Immediate);
    t[0xCA] = instr(Dex, Implied);
    t[0xCC] = instr(Cpy, Absolute);
    t[0xCD] = instr(Cmp, Absolute);
    t[0xCE] = instr(Dec, Absolute);
    t[0xD0] = instr(Bne, Relative);
    t[0xD1] = instr(Cmp, IndirectY);
    t[0xD5] = instr(Cmp, ZeroPageX);
    t[0xD6] = instr(Dec, ZeroPageX);
    t[0xD8] = instr(Cld, Implied);
    t[0xD9] = instr(Cmp, AbsoluteY);
    t[0xDD] = instr(Cmp, AbsoluteX);
    t[0xDE] = instr(Dec, AbsoluteX);
    t[0xE0] = instr(Cpx, Immediate);
    t[0xE1] = instr(Sbc, IndirectX);
    t[0xE4] = instr(Cpx, ZeroPage);
    t[0xE5] = instr(Sbc, ZeroPage);
    t[0xE6] = instr(Inc, ZeroPage);
    t[0xE8] = instr(Inx, Implied);
    t[0xE9] = instr(Sbc, Immediate);
    t[0xEA] = instr(Nop, Implied);
    t[0xEC] = instr(Cpx, Absolute);
    t[0xED] = instr(Sbc, Absolute);
    t[0xEE] = instr(Inc, Absolute);
    t[0xF0] = instr(Beq, Relative);
    t[0xF1] = instr(Sbc, IndirectY);
    t[0xF5] = instr(Sbc, ZeroPageX);
    t[0xF6] = instr(Inc, ZeroPageX);
    t[0xF8] = instr(Sed, Implied);
    t[0xF9] = instr(Sbc, AbsoluteY);
    t[0xFD] = instr(Sbc, AbsoluteX);
    t[0xFE] = instr(Inc, AbsoluteX);

    t
};

#[derive(Serialize, Deserialize)]
pub struct M6502 {
    a: u8,
    x: u8,
    y: u8,
    s: u8,
    pc: u16,
    flags: StatusFlags,
    cycles: u64,
    debug: bool,
    throttle: Option<Duration>,
}

impl M6502 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            s: 0xFF,
            pc: RESV_ADDR,
            flags: StatusFlags::empty(),
            cycles: 0,
            debug: false,
            throttle: None,
        }
    }

    /// Power-on / reset: registers cleared, SP at the top of the stack
    /// page, PC loaded from the reset vector. Costs the two vector-fetch
    /// cycles.
    pub fn reset(&mut self, bus: &Bus) {
        self.pc = RESV_ADDR;
        self.s = 0xFF;
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.flags = StatusFlags::empty();
        self.pc = self.fetch_word(bus);
        trace!("reset -> pc 0x{:04x}", self.pc);
    }

    /// Maskable interrupt request. Ignored while I is set.
    pub fn irq(&mut self, bus: &Bus) {
        if self.flags.contains(StatusFlags::I) {
            return;
        }
        self.interrupt(bus, INTV_ADDR);
    }

    /// Non-maskable interrupt. Same entry sequence as IRQ, from the NMI
    /// vector, regardless of I.
    pub fn nmi(&mut self, bus: &Bus) {
        self.interrupt(bus, NMIV_ADDR);
    }

    fn interrupt(&mut self, bus: &Bus, vector: u16) {
        self.push_word(bus, self.pc.wrapping_add(1));
        self.push_status(bus, false);
        self.flags.insert(StatusFlags::I);
        self.pc = self.read_word(bus, vector);
        self.clock(2);
    }

    /// Runs fetch-decode-execute until at least `budget` cycles have
    /// elapsed or `running` is cleared. Returns the cycles consumed.
    /// Callers may loop to extend the budget.
    pub fn execute(&mut self, bus: &Bus, budget: u64, running: &AtomicBool) -> u64 {
        let start = self.cycles;
        while self.cycles - start < budget && running.load(Ordering::Acquire) {
            self.step(bus);
        }
        self.cycles - start
    }

    /// Executes a single instruction and returns its cycle cost.
    pub fn step(&mut self, bus: &Bus) -> u64 {
        let start = self.cycles;
        let at = self.pc;
        let opcode = self.fetch_byte(bus);
        match OPCODES[opcode as usize] {
            Some(i) => self.exec(bus, i),
            // Non-fatal: report and continue with the next byte.
            None => error!("unknown opcode 0x{opcode:02X} at 0x{at:04X}"),
        }
        let elapsed = self.cycles - start;
        if let Some(per_cycle) = self.throttle {
            std::thread::sleep(per_cycle * elapsed as u32);
        }
        elapsed
    }

    // Cycle accounting lives in these wrappers and in explicit `clock`
    // calls, never in the bus.

    #[inline]
    fn clock(&mut self, c: u64) {
        self.cycles += c;
    }

    fn read_byte(&mut self, bus: &Bus, addr: u16) -> u8 {
        self.clock(1);
        let b = bus.read(addr);
        if self.debug {
            trace!("{addr:04X} READ {b:02X}");
        }
        b
    }

    fn write_byte(&mut self, bus: &Bus, addr: u16, data: u8) {
        bus.write(addr, data);
        self.clock(1);
        if self.debug {
            trace!("{addr:04X} WRITE {data:02X}");
        }
    }

    fn fetch_byte(&mut self, bus: &Bus) -> u8 {
        let b = self.read_byte(bus, self.pc);
        self.pc = self.pc.wrapping_add(1);
        b
    }

    fn fetch_word(&mut self, bus: &Bus) -> u16 {
        let lo = self.fetch_byte(bus);
        let hi = self.fetch_byte(bus);
        u16::from(lo) | u16::from(hi) << 8
    }

    fn read_word(&mut self, bus: &Bus, addr: u16) -> u16 {
        let lo = self.read_byte(bus, addr);
        let hi = self.read_byte(bus, addr.wrapping_add(1));
        u16::from(lo) | u16::from(hi) << 8
    }

    // Stack. SP wraps modulo 256 by design.

    fn push_byte(&mut self, bus: &Bus, data: u8) {
        self.write_byte(bus, STACK_ADDR + u16::from(self.s), data);
        self.s = self.s.wrapping_sub(1);
    }

    fn pop_byte(&mut self, bus: &Bus) -> u8 {
        self.s = self.s.wrapping_add(1);
        self.read_byte(bus, STACK_ADDR + u16::from(self.s))
    }

    fn push_word(&mut self, bus: &Bus, data: u16) {
        self.push_byte(bus, (data >> 8) as u8);
        self.push_byte(bus, data as u8);
    }

    fn pop_word(&mut self, bus: &Bus) -> u16 {
        let lo = self.pop_byte(bus);
        let hi = self.pop_byte(bus);
        u16::from(lo) | u16::from(hi) << 8
    }

    fn push_status(&mut self, bus: &Bus, brk: bool) {
        let mut p = self.flags | StatusFlags::U;
        p.set(StatusFlags::B, brk);
        self.push_byte(bus, p.bits());
    }

    // B and the pushed-as-1 bit are not part of the live register; the
    // popped values of both are ignored.
    fn pop_status(&mut self, bus: &Bus) {
        let b = self.pop_byte(bus);
        let keep = self.flags & (StatusFlags::B | StatusFlags::U);
        self.flags = (StatusFlags::from_bits_truncate(b) - (StatusFlags::B | StatusFlags::U)) | keep;
    }

    // Effective-address computation, including the page-cross penalties.

    fn indexed(&mut self, bus: &Bus, index: u8) -> u16 {
        let base = self.fetch_word(bus);
        let addr = base.wrapping_add(u16::from(index));
        if addr & 0xFF00 != base & 0xFF00 {
            self.clock(1);
        }
        addr
    }

    fn operand_address(&mut self, bus: &Bus, mode: AddrMode) -> u16 {
        match mode {
            AddrMode::ZeroPage => u16::from(self.fetch_byte(bus)),
            AddrMode::ZeroPageX => {
                let base = self.fetch_byte(bus);
                self.clock(1);
                u16::from(base.wrapping_add(self.x))
            }
            AddrMode::ZeroPageY => {
                let base = self.fetch_byte(bus);
                self.clock(1);
                u16::from(base.wrapping_add(self.y))
            }
            AddrMode::Absolute => self.fetch_word(bus),
            AddrMode::AbsoluteX => self.indexed(bus, self.x),
            AddrMode::AbsoluteY => self.indexed(bus, self.y),
            AddrMode::Indirect => {
                let ptr = self.fetch_word(bus);
                self.read_word(bus, ptr)
            }
            AddrMode::IndirectX => {
                let base = self.fetch_byte(bus);
                self.clock(1);
                let ptr = u16::from(base.wrapping_add(self.x));
                self.read_word(bus, ptr)
            }
            AddrMode::IndirectY => {
                let ptr = u16::from(self.fetch_byte(bus));
                let base = self.read_word(bus, ptr);
                let addr = base.wrapping_add(u16::from(self.y));
                if addr & 0xFF00 != base & 0xFF00 {
                    self.clock(1);
                }
                addr
            }
            AddrMode::Implied | AddrMode::Accumulator | AddrMode::Immediate | AddrMode::Relative => {
                unreachable!("mode carries no address")
            }
        }
    }

    fn load_operand(&mut self, bus: &Bus, mode: AddrMode) -> u8 {
        match mode {
            AddrMode::Accumulator => self.a,
            AddrMode::Immediate => self.fetch_byte(bus),
            _ => {
                let addr = self.operand_address(bus, mode);
                self.read_byte(bus, addr)
            }
        }
    }

    // Read-modify-write: accumulator in place, or read/modify/write at the
    // effective address. Both forms pay one internal cycle.
    fn modify(&mut self, bus: &Bus, mode: AddrMode, f: fn(&mut Self, u8) -> u8) {
        match mode {
            AddrMode::Accumulator => {
                let r = f(self, self.a);
                self.a = r;
                self.clock(1);
            }
            _ => {
                let addr = self.operand_address(bus, mode);
                let v = self.read_byte(bus, addr);
                let r = f(self, v);
                self.write_byte(bus, addr, r);
                self.clock(1);
            }
        }
    }

    #[inline]
    fn nz(&mut self, v: u8) {
        self.flags.set(StatusFlags::Z, v == 0);
        self.flags.set(StatusFlags::N, v & 0x80 != 0);
    }

    fn adc(&mut self, val: u8) {
        let sum = u16::from(self.a)
            + u16::from(val)
            + u16::from(self.flags.contains(StatusFlags::C));
        self.flags
            .set(StatusFlags::V, !(self.a ^ val) & (self.a ^ sum as u8) & 0x80 != 0);
        self.flags.set(StatusFlags::C, sum & 0xFF00 != 0);
        self.a = sum as u8;
        self.nz(self.a);
    }

    fn compare(&mut self, reg: u8, val: u8) {
        self.nz(reg.wrapping_sub(val));
        self.flags.set(StatusFlags::C, reg >= val);
    }

    fn asl(&mut self, v: u8) -> u8 {
        let r = v << 1;
        self.nz(r);
        self.flags.set(StatusFlags::C, v & 0x80 != 0);
        r
    }

    fn lsr(&mut self, v: u8) -> u8 {
        let r = v >> 1;
        self.nz(r);
        self.flags.set(StatusFlags::C, v & 0x01 != 0);
        r
    }

    fn rol(&mut self, v: u8) -> u8 {
        let r = v << 1 | u8::from(self.flags.contains(StatusFlags::C));
        self.nz(r);
        self.flags.set(StatusFlags::C, v & 0x80 != 0);
        r
    }

    fn ror(&mut self, v: u8) -> u8 {
        let r = v >> 1 | u8::from(self.flags.contains(StatusFlags::C)) << 7;
        self.nz(r);
        self.flags.set(StatusFlags::C, v & 0x01 != 0);
        r
    }

    fn inc(&mut self, v: u8) -> u8 {
        let r = v.wrapping_add(1);
        self.nz(r);
        r
    }

    fn dec(&mut self, v: u8) -> u8 {
        let r = v.wrapping_sub(1);
        self.nz(r);
        r
    }

    fn branch(&mut self, bus: &Bus, taken: bool) {
        let rel = self.fetch_byte(bus) as i8;
        if taken {
            self.clock(1);
            let target = self.pc.wrapping_add(rel as u16);
            if target & 0xFF00 != self.pc & 0xFF00 {
                self.clock(1);
            }
            self.pc = target;
        }
    }

    fn set_flag(&mut self, flag: StatusFlags, value: bool) {
        self.flags.set(flag, value);
        self.clock(1);
    }

    fn exec(&mut self, bus: &Bus, i: Instruction) {
        use Op::*;
        match i.op {
            Lda => {
                let v = self.load_operand(bus, i.mode);
                self.a = v;
                self.nz(v);
            }
            Ldx => {
                let v = self.load_operand(bus, i.mode);
                self.x = v;
                self.nz(v);
            }
            Ldy => {
                let v = self.load_operand(bus, i.mode);
                self.y = v;
                self.nz(v);
            }
            Sta => {
                let addr = self.operand_address(bus, i.mode);
                self.write_byte(bus, addr, self.a);
            }
            Stx => {
                let addr = self.operand_address(bus, i.mode);
                self.write_byte(bus, addr, self.x);
            }
            Sty => {
                let addr = self.operand_address(bus, i.mode);
                self.write_byte(bus, addr, self.y);
            }

            Tax => {
                self.x = self.a;
                self.nz(self.x);
                self.clock(1);
            }
            Tay => {
                self.y = self.a;
                self.nz(self.y);
                self.clock(1);
            }
            Tsx => {
                self.x = self.s;
                self.nz(self.x);
                self.clock(1);
            }
            Txa => {
                self.a = self.x;
                self.nz(self.a);
                self.clock(1);
            }
            Tya => {
                self.a = self.y;
                self.nz(self.a);
                self.clock(1);
            }
            // TXS leaves the flags alone.
            Txs => {
                self.s = self.x;
                self.clock(1);
            }

            Pha => {
                let a = self.a;
                self.push_byte(bus, a);
                self.clock(1);
            }
            Pla => {
                let v = self.pop_byte(bus);
                self.a = v;
                self.nz(v);
                self.clock(2);
            }
            Php => {
                self.push_status(bus, true);
                self.clock(1);
            }
            Plp => {
                self.pop_status(bus);
                self.clock(2);
            }

            And => {
                let v = self.load_operand(bus, i.mode);
                self.a &= v;
                self.nz(self.a);
            }
            Ora => {
                let v = self.load_operand(bus, i.mode);
                self.a |= v;
                self.nz(self.a);
            }
            Eor => {
                let v = self.load_operand(bus, i.mode);
                self.a ^= v;
                self.nz(self.a);
            }

            // D is carried but never applied: binary arithmetic only.
            Adc => {
                let v = self.load_operand(bus, i.mode);
                self.adc(v);
            }
            Sbc => {
                let v = self.load_operand(bus, i.mode);
                self.adc(v ^ 0xFF);
            }

            Cmp => {
                let v = self.load_operand(bus, i.mode);
                self.compare(self.a, v);
            }
            Cpx => {
                let v = self.load_operand(bus, i.mode);
                self.compare(self.x, v);
            }
            Cpy => {
                let v = self.load_operand(bus, i.mode);
                self.compare(self.y, v);
            }

            Bit => {
                let v = self.load_operand(bus, i.mode);
                self.flags.set(StatusFlags::Z, self.a & v == 0);
                self.flags.set(StatusFlags::N, v & 0x80 != 0);
                self.flags.set(StatusFlags::V, v & 0x40 != 0);
            }

            Inc => self.modify(bus, i.mode, Self::inc),
            Dec => self.modify(bus, i.mode, Self::dec),
            Inx => {
                self.x = self.x.wrapping_add(1);
                self.nz(self.x);
                self.clock(1);
            }
            Iny => {
                self.y = self.y.wrapping_add(1);
                self.nz(self.y);
                self.clock(1);
            }
            Dex => {
                self.x = self.x.wrapping_sub(1);
                self.nz(self.x);
                self.clock(1);
            }
            Dey => {
                self.y = self.y.wrapping_sub(1);
                self.nz(self.y);
                self.clock(1);
            }

            Asl => self.modify(bus, i.mode, Self::asl),
            Lsr => self.modify(bus, i.mode, Self::lsr),
            Rol => self.modify(bus, i.mode, Self::rol),
            Ror => self.modify(bus, i.mode, Self::ror),

            Jmp => {
                self.pc = self.operand_address(bus, i.mode);
            }
            Jsr => {
                let target = self.fetch_word(bus);
                let ret = self.pc.wrapping_sub(1);
                self.push_word(bus, ret);
                self.pc = target;
                self.clock(1);
            }
            Rts => {
                let ret = self.pop_word(bus);
                self.pc = ret.wrapping_add(1);
                self.clock(3);
            }

            Bcc => self.branch(bus, !self.flags.contains(StatusFlags::C)),
            Bcs => self.branch(bus, self.flags.contains(StatusFlags::C)),
            Beq => self.branch(bus, self.flags.contains(StatusFlags::Z)),
            Bne => self.branch(bus, !self.flags.contains(StatusFlags::Z)),
            Bpl => self.branch(bus, !self.flags.contains(StatusFlags::N)),
            Bmi => self.branch(bus, self.flags.contains(StatusFlags::N)),
            Bvc => self.branch(bus, !self.flags.contains(StatusFlags::V)),
            Bvs => self.branch(bus, self.flags.contains(StatusFlags::V)),

            Brk => {
                let ret = self.pc.wrapping_add(1);
                self.push_word(bus, ret);
                self.push_status(bus, true);
                self.flags.insert(StatusFlags::I);
                self.pc = self.read_word(bus, INTV_ADDR);
                self.clock(1);
            }
            // Unlike RTS, the popped PC is used as-is.
            Rti => {
                self.pop_status(bus);
                self.pc = self.pop_word(bus);
                self.clock(2);
            }

            Clc => self.set_flag(StatusFlags::C, false),
            Sec => self.set_flag(StatusFlags::C, true),
            Cld => self.set_flag(StatusFlags::D, false),
            Sed => self.set_flag(StatusFlags::D, true),
            Cli => self.set_flag(StatusFlags::I, false),
            Sei => self.set_flag(StatusFlags::I, true),
            Clv => self.set_flag(StatusFlags::V, false),

            Nop => self.clock(1),
        }
    }

    #[inline]
    #[must_use]
    pub fn a(&self) -> u8 {
        self.a
    }

    #[inline]
    #[must_use]
    pub fn x(&self) -> u8 {
        self.x
    }

    #[inline]
    #[must_use]
    pub fn y(&self) -> u8 {
        self.y
    }

    #[inline]
    #[must_use]
    pub fn s(&self) -> u8 {
        self.s
    }

    #[inline]
    #[must_use]
    pub fn pc(&self) -> u16 {
        self.pc
    }

    #[inline]
    #[must_use]
    pub fn flags(&self) -> StatusFlags {
        self.flags
    }

    #[inline]
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    #[inline]
    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    #[inline]
    pub fn set_s(&mut self, s: u8) {
        self.s = s;
    }

    #[inline]
    pub fn set_flags(&mut self, flags: StatusFlags) {
        self.flags = flags;
    }

    #[inline]
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    #[inline]
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Optional coarse throttling: sleep `per_cycle × cycles` after each
    /// instruction.
    #[inline]
    pub fn set_throttle(&mut self, per_cycle: Option<Duration>) {
        self.throttle = per_cycle;
    }
}

impl Default for M6502 {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for M6502 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ a:0x{:02x} x:0x{:02x} y:0x{:02x} s:0x{:02x} pc:0x{:04x} flags:{:?} cycles:{} }}",
            self.a, self.x, self.y, self.s, self.pc, self.flags, self.cycles
        )
    }
}

/// The shutdown report: registers in hex and the flag row as digits.
impl fmt::Display for M6502 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "A:{:02X} X:{:02X} Y:{:02X}", self.a, self.x, self.y)?;
        writeln!(f, "N V D I Z C")?;
        write!(
            f,
            "{} {} {} {} {} {}",
            u8::from(self.flags.contains(StatusFlags::N)),
            u8::from(self.flags.contains(StatusFlags::V)),
            u8::from(self.flags.contains(StatusFlags::D)),
            u8::from(self.flags.contains(StatusFlags::I)),
            u8::from(self.flags.contains(StatusFlags::Z)),
            u8::from(self.flags.contains(StatusFlags::C)),
        )
    }
}
