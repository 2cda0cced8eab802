//! The 6502 opcode table.
//!
//! One immutable entry per opcode byte, built at compile time. Both the
//! executor and the cycle accounting read from it; nothing else knows the
//! base cycle counts.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Adc,
    And,
    Asl,
    Bcc,
    Bcs,
    Beq,
    Bit,
    Bmi,
    Bne,
    Bpl,
    Brk,
    Bvc,
    Bvs,
    Clc,
    Cld,
    Cli,
    Clv,
    Cmp,
    Cpx,
    Cpy,
    Dec,
    Dex,
    Dey,
    Eor,
    Inc,
    Inx,
    Iny,
    Jmp,
    Jsr,
    Lda,
    Ldx,
    Ldy,
    Lsr,
    Nop,
    Ora,
    Pha,
    Php,
    Pla,
    Plp,
    Rol,
    Ror,
    Rti,
    Rts,
    Sbc,
    Sec,
    Sed,
    Sei,
    Sta,
    Stx,
    Sty,
    Tax,
    Tay,
    Tsx,
    Txa,
    Txs,
    Tya,
    // Stable undocumented opcodes.
    Alr,
    Anc,
    Arr,
    Axs,
    Dcp,
    Isc,
    Lax,
    Rla,
    Rra,
    Sax,
    Slo,
    Sre,
    // Lock-up opcodes and undocumented opcodes with unstable results.
    Jam,
    Unstable,
}

impl Mnemonic {
    pub const fn name(self) -> &'static str {
        match self {
            Mnemonic::Adc => "ADC",
            Mnemonic::And => "AND",
            Mnemonic::Asl => "ASL",
            Mnemonic::Bcc => "BCC",
            Mnemonic::Bcs => "BCS",
            Mnemonic::Beq => "BEQ",
            Mnemonic::Bit => "BIT",
            Mnemonic::Bmi => "BMI",
            Mnemonic::Bne => "BNE",
            Mnemonic::Bpl => "BPL",
            Mnemonic::Brk => "BRK",
            Mnemonic::Bvc => "BVC",
            Mnemonic::Bvs => "BVS",
            Mnemonic::Clc => "CLC",
            Mnemonic::Cld => "CLD",
            Mnemonic::Cli => "CLI",
            Mnemonic::Clv => "CLV",
            Mnemonic::Cmp => "CMP",
            Mnemonic::Cpx => "CPX",
            Mnemonic::Cpy => "CPY",
            Mnemonic::Dec => "DEC",
            Mnemonic::Dex => "DEX",
            Mnemonic::Dey => "DEY",
            Mnemonic::Eor => "EOR",
            Mnemonic::Inc => "INC",
            Mnemonic::Inx => "INX",
            Mnemonic::Iny => "INY",
            Mnemonic::Jmp => "JMP",
            Mnemonic::Jsr => "JSR",
            Mnemonic::Lda => "LDA",
            Mnemonic::Ldx => "LDX",
            Mnemonic::Ldy => "LDY",
            Mnemonic::Lsr => "LSR",
            Mnemonic::Nop => "NOP",
            Mnemonic::Ora => "ORA",
            Mnemonic::Pha => "PHA",
            Mnemonic::Php => "PHP",
            Mnemonic::Pla => "PLA",
            Mnemonic::Plp => "PLP",
            Mnemonic::Rol => "ROL",
            Mnemonic::Ror => "ROR",
            Mnemonic::Rti => "RTI",
            Mnemonic::Rts => "RTS",
            Mnemonic::Sbc => "SBC",
            Mnemonic::Sec => "SEC",
            Mnemonic::Sed => "SED",
            Mnemonic::Sei => "SEI",
            Mnemonic::Sta => "STA",
            Mnemonic::Stx => "STX",
            Mnemonic::Sty => "STY",
            Mnemonic::Tax => "TAX",
            Mnemonic::Tay => "TAY",
            Mnemonic::Tsx => "TSX",
            Mnemonic::Txa => "TXA",
            Mnemonic::Txs => "TXS",
            Mnemonic::Tya => "TYA",
            Mnemonic::Alr => "ALR",
            Mnemonic::Anc => "ANC",
            Mnemonic::Arr => "ARR",
            Mnemonic::Axs => "AXS",
            Mnemonic::Dcp => "DCP",
            Mnemonic::Isc => "ISC",
            Mnemonic::Lax => "LAX",
            Mnemonic::Rla => "RLA",
            Mnemonic::Rra => "RRA",
            Mnemonic::Sax => "SAX",
            Mnemonic::Slo => "SLO",
            Mnemonic::Sre => "SRE",
            Mnemonic::Jam => "JAM",
            Mnemonic::Unstable => "???",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressingMode {
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

impl AddressingMode {
    /// Operand bytes following the opcode.
    pub const fn operand_len(self) -> u16 {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 0,
            AddressingMode::Immediate
            | AddressingMode::ZeroPage
            | AddressingMode::ZeroPageX
            | AddressingMode::ZeroPageY
            | AddressingMode::IndirectX
            | AddressingMode::IndirectY
            | AddressingMode::Relative => 1,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Legality {
    Official,
    Unofficial,
    /// Executing this opcode halts the CPU.
    Unimplemented,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstructionDefinition {
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    pub cycles: u8,
    /// Adds one cycle when indexing crosses a page.
    pub page_penalty: bool,
    pub legality: Legality,
}

impl InstructionDefinition {
    const JAM: Self = Self {
        mnemonic: Mnemonic::Jam,
        mode: AddressingMode::Implied,
        cycles: 2,
        page_penalty: false,
        legality: Legality::Unimplemented,
    };

    pub const fn is_executable(&self) -> bool {
        !matches!(self.legality, Legality::Unimplemented)
    }

    pub const fn is_official(&self) -> bool {
        matches!(self.legality, Legality::Official)
    }

    /// Opcode plus operand bytes.
    pub const fn byte_len(&self) -> u16 {
        1 + self.mode.operand_len()
    }
}

pub static INSTRUCTIONS: [InstructionDefinition; 256] = build_table();

pub fn lookup(opcode: u8) -> &'static InstructionDefinition {
    &INSTRUCTIONS[opcode as usize]
}

const fn set(
    table: &mut [InstructionDefinition; 256],
    opcode: u8,
    mnemonic: Mnemonic,
    mode: AddressingMode,
    cycles: u8,
    page_penalty: bool,
    legality: Legality,
) {
    table[opcode as usize] = InstructionDefinition {
        mnemonic,
        mode,
        cycles,
        page_penalty,
        legality,
    };
}

const fn official(
    table: &mut [InstructionDefinition; 256],
    opcode: u8,
    mnemonic: Mnemonic,
    mode: AddressingMode,
    cycles: u8,
) {
    set(table, opcode, mnemonic, mode, cycles, false, Legality::Official);
}

const fn official_paged(
    table: &mut [InstructionDefinition; 256],
    opcode: u8,
    mnemonic: Mnemonic,
    mode: AddressingMode,
    cycles: u8,
) {
    set(table, opcode, mnemonic, mode, cycles, true, Legality::Official);
}

const fn unofficial(
    table: &mut [InstructionDefinition; 256],
    opcode: u8,
    mnemonic: Mnemonic,
    mode: AddressingMode,
    cycles: u8,
    page_penalty: bool,
) {
    set(
        table,
        opcode,
        mnemonic,
        mode,
        cycles,
        page_penalty,
        Legality::Unofficial,
    );
}

/// The eight-mode read group (ORA AND EOR ADC LDA CMP SBC) at `base | 0x01`.
const fn read_group(table: &mut [InstructionDefinition; 256], base: u8, mnemonic: Mnemonic) {
    use AddressingMode::*;
    official(table, base | 0x01, mnemonic, IndirectX, 6);
    official(table, base | 0x05, mnemonic, ZeroPage, 3);
    official(table, base | 0x09, mnemonic, Immediate, 2);
    official(table, base | 0x0D, mnemonic, Absolute, 4);
    official_paged(table, base | 0x11, mnemonic, IndirectY, 5);
    official(table, base | 0x15, mnemonic, ZeroPageX, 4);
    official_paged(table, base | 0x19, mnemonic, AbsoluteY, 4);
    official_paged(table, base | 0x1D, mnemonic, AbsoluteX, 4);
}

/// Read-modify-write on memory (ASL ROL LSR ROR DEC INC) at `base | 0x06`.
const fn modify_group(table: &mut [InstructionDefinition; 256], base: u8, mnemonic: Mnemonic) {
    use AddressingMode::*;
    official(table, base | 0x06, mnemonic, ZeroPage, 5);
    official(table, base | 0x0E, mnemonic, Absolute, 6);
    official(table, base | 0x16, mnemonic, ZeroPageX, 6);
    official(table, base | 0x1E, mnemonic, AbsoluteX, 7);
}

/// Undocumented read-modify-write combos (SLO RLA SRE RRA DCP ISC) at `base | 0x03`.
const fn combo_group(table: &mut [InstructionDefinition; 256], base: u8, mnemonic: Mnemonic) {
    use AddressingMode::*;
    unofficial(table, base | 0x03, mnemonic, IndirectX, 8, false);
    unofficial(table, base | 0x07, mnemonic, ZeroPage, 5, false);
    unofficial(table, base | 0x0F, mnemonic, Absolute, 6, false);
    unofficial(table, base | 0x13, mnemonic, IndirectY, 8, false);
    unofficial(table, base | 0x17, mnemonic, ZeroPageX, 6, false);
    unofficial(table, base | 0x1B, mnemonic, AbsoluteY, 7, false);
    unofficial(table, base | 0x1F, mnemonic, AbsoluteX, 7, false);
}

const fn build_table() -> [InstructionDefinition; 256] {
    use AddressingMode::*;
    use Mnemonic::*;

    let mut t = [InstructionDefinition::JAM; 256];

    read_group(&mut t, 0x00, Ora);
    read_group(&mut t, 0x20, And);
    read_group(&mut t, 0x40, Eor);
    read_group(&mut t, 0x60, Adc);
    read_group(&mut t, 0xA0, Lda);
    read_group(&mut t, 0xC0, Cmp);
    read_group(&mut t, 0xE0, Sbc);

    // STA has no immediate form and never takes the page penalty.
    official(&mut t, 0x81, Sta, IndirectX, 6);
    official(&mut t, 0x85, Sta, ZeroPage, 3);
    official(&mut t, 0x8D, Sta, Absolute, 4);
    official(&mut t, 0x91, Sta, IndirectY, 6);
    official(&mut t, 0x95, Sta, ZeroPageX, 4);
    official(&mut t, 0x99, Sta, AbsoluteY, 5);
    official(&mut t, 0x9D, Sta, AbsoluteX, 5);

    modify_group(&mut t, 0x00, Asl);
    modify_group(&mut t, 0x20, Rol);
    modify_group(&mut t, 0x40, Lsr);
    modify_group(&mut t, 0x60, Ror);
    modify_group(&mut t, 0xC0, Dec);
    modify_group(&mut t, 0xE0, Inc);
    official(&mut t, 0x0A, Asl, Accumulator, 2);
    official(&mut t, 0x2A, Rol, Accumulator, 2);
    official(&mut t, 0x4A, Lsr, Accumulator, 2);
    official(&mut t, 0x6A, Ror, Accumulator, 2);

    official(&mut t, 0xA2, Ldx, Immediate, 2);
    official(&mut t, 0xA6, Ldx, ZeroPage, 3);
    official(&mut t, 0xAE, Ldx, Absolute, 4);
    official(&mut t, 0xB6, Ldx, ZeroPageY, 4);
    official_paged(&mut t, 0xBE, Ldx, AbsoluteY, 4);

    official(&mut t, 0xA0, Ldy, Immediate, 2);
    official(&mut t, 0xA4, Ldy, ZeroPage, 3);
    official(&mut t, 0xAC, Ldy, Absolute, 4);
    official(&mut t, 0xB4, Ldy, ZeroPageX, 4);
    official_paged(&mut t, 0xBC, Ldy, AbsoluteX, 4);

    official(&mut t, 0x86, Stx, ZeroPage, 3);
    official(&mut t, 0x8E, Stx, Absolute, 4);
    official(&mut t, 0x96, Stx, ZeroPageY, 4);
    official(&mut t, 0x84, Sty, ZeroPage, 3);
    official(&mut t, 0x8C, Sty, Absolute, 4);
    official(&mut t, 0x94, Sty, ZeroPageX, 4);

    official(&mut t, 0xE0, Cpx, Immediate, 2);
    official(&mut t, 0xE4, Cpx, ZeroPage, 3);
    official(&mut t, 0xEC, Cpx, Absolute, 4);
    official(&mut t, 0xC0, Cpy, Immediate, 2);
    official(&mut t, 0xC4, Cpy, ZeroPage, 3);
    official(&mut t, 0xCC, Cpy, Absolute, 4);

    official(&mut t, 0x24, Bit, ZeroPage, 3);
    official(&mut t, 0x2C, Bit, Absolute, 4);

    official(&mut t, 0x10, Bpl, Relative, 2);
    official(&mut t, 0x30, Bmi, Relative, 2);
    official(&mut t, 0x50, Bvc, Relative, 2);
    official(&mut t, 0x70, Bvs, Relative, 2);
    official(&mut t, 0x90, Bcc, Relative, 2);
    official(&mut t, 0xB0, Bcs, Relative, 2);
    official(&mut t, 0xD0, Bne, Relative, 2);
    official(&mut t, 0xF0, Beq, Relative, 2);

    official(&mut t, 0x00, Brk, Implied, 7);
    official(&mut t, 0x20, Jsr, Absolute, 6);
    official(&mut t, 0x40, Rti, Implied, 6);
    official(&mut t, 0x60, Rts, Implied, 6);
    official(&mut t, 0x4C, Jmp, Absolute, 3);
    official(&mut t, 0x6C, Jmp, Indirect, 5);

    official(&mut t, 0x08, Php, Implied, 3);
    official(&mut t, 0x28, Plp, Implied, 4);
    official(&mut t, 0x48, Pha, Implied, 3);
    official(&mut t, 0x68, Pla, Implied, 4);

    official(&mut t, 0x18, Clc, Implied, 2);
    official(&mut t, 0x38, Sec, Implied, 2);
    official(&mut t, 0x58, Cli, Implied, 2);
    official(&mut t, 0x78, Sei, Implied, 2);
    official(&mut t, 0xB8, Clv, Implied, 2);
    official(&mut t, 0xD8, Cld, Implied, 2);
    official(&mut t, 0xF8, Sed, Implied, 2);

    official(&mut t, 0x88, Dey, Implied, 2);
    official(&mut t, 0xCA, Dex, Implied, 2);
    official(&mut t, 0xC8, Iny, Implied, 2);
    official(&mut t, 0xE8, Inx, Implied, 2);
    official(&mut t, 0x8A, Txa, Implied, 2);
    official(&mut t, 0x98, Tya, Implied, 2);
    official(&mut t, 0x9A, Txs, Implied, 2);
    official(&mut t, 0xA8, Tay, Implied, 2);
    official(&mut t, 0xAA, Tax, Implied, 2);
    official(&mut t, 0xBA, Tsx, Implied, 2);
    official(&mut t, 0xEA, Nop, Implied, 2);

    // Undocumented NOPs.
    let mut i = 0;
    let implied_nops = [0x1A, 0x3A, 0x5A, 0x7A, 0xDA, 0xFA];
    while i < implied_nops.len() {
        unofficial(&mut t, implied_nops[i], Nop, Implied, 2, false);
        i += 1;
    }
    let mut i = 0;
    let immediate_nops = [0x80, 0x82, 0x89, 0xC2, 0xE2];
    while i < immediate_nops.len() {
        unofficial(&mut t, immediate_nops[i], Nop, Immediate, 2, false);
        i += 1;
    }
    unofficial(&mut t, 0x04, Nop, ZeroPage, 3, false);
    unofficial(&mut t, 0x44, Nop, ZeroPage, 3, false);
    unofficial(&mut t, 0x64, Nop, ZeroPage, 3, false);
    unofficial(&mut t, 0x0C, Nop, Absolute, 4, false);
    let mut i = 0;
    let indexed_nops = [0x14, 0x34, 0x54, 0x74, 0xD4, 0xF4];
    while i < indexed_nops.len() {
        unofficial(&mut t, indexed_nops[i], Nop, ZeroPageX, 4, false);
        unofficial(&mut t, indexed_nops[i] + 0x08, Nop, AbsoluteX, 4, true);
        i += 1;
    }

    unofficial(&mut t, 0xA3, Lax, IndirectX, 6, false);
    unofficial(&mut t, 0xA7, Lax, ZeroPage, 3, false);
    unofficial(&mut t, 0xAF, Lax, Absolute, 4, false);
    unofficial(&mut t, 0xB3, Lax, IndirectY, 5, true);
    unofficial(&mut t, 0xB7, Lax, ZeroPageY, 4, false);
    unofficial(&mut t, 0xBF, Lax, AbsoluteY, 4, true);

    unofficial(&mut t, 0x83, Sax, IndirectX, 6, false);
    unofficial(&mut t, 0x87, Sax, ZeroPage, 3, false);
    unofficial(&mut t, 0x8F, Sax, Absolute, 4, false);
    unofficial(&mut t, 0x97, Sax, ZeroPageY, 4, false);

    combo_group(&mut t, 0x00, Slo);
    combo_group(&mut t, 0x20, Rla);
    combo_group(&mut t, 0x40, Sre);
    combo_group(&mut t, 0x60, Rra);
    combo_group(&mut t, 0xC0, Dcp);
    combo_group(&mut t, 0xE0, Isc);

    unofficial(&mut t, 0xEB, Sbc, Immediate, 2, false);
    unofficial(&mut t, 0x0B, Anc, Immediate, 2, false);
    unofficial(&mut t, 0x2B, Anc, Immediate, 2, false);
    unofficial(&mut t, 0x4B, Alr, Immediate, 2, false);
    unofficial(&mut t, 0x6B, Arr, Immediate, 2, false);
    unofficial(&mut t, 0xCB, Axs, Immediate, 2, false);

    let mut i = 0;
    let unstable = [0x8B, 0xAB, 0x93, 0x9B, 0x9C, 0x9E, 0x9F, 0xBB];
    while i < unstable.len() {
        set(
            &mut t,
            unstable[i],
            Unstable,
            Implied,
            2,
            false,
            Legality::Unimplemented,
        );
        i += 1;
    }

    t
}
