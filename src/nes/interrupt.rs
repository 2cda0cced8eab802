/// Interrupt sources the CPU can be asked to service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptKind {
    Nmi,
    Irq,
    Reset,
}

impl InterruptKind {
    pub const fn vector(self) -> u16 {
        match self {
            InterruptKind::Nmi => NMI_VECTOR,
            InterruptKind::Irq => IRQ_VECTOR,
            InterruptKind::Reset => RESET_VECTOR,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            InterruptKind::Nmi => PENDING_NMI,
            InterruptKind::Irq => PENDING_IRQ,
            InterruptKind::Reset => PENDING_RESET,
        }
    }
}

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

const PENDING_NMI: u8 = 0x01;
const PENDING_IRQ: u8 = 0x02;
const PENDING_RESET: u8 = 0x04;
const IRQ_LINE: u8 = 0x08;

/// Latched interrupt requests plus the external IRQ line level.
///
/// NMI and Reset are edge requests: they stay latched until serviced. IRQ is
/// asserted either by an explicit request (latched) or by the level of the
/// shared cartridge/APU line, which the system refreshes every CPU cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PendingInterrupts {
    bits: u8,
}

impl PendingInterrupts {
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            bits: bits & (PENDING_NMI | PENDING_IRQ | PENDING_RESET | IRQ_LINE),
        }
    }

    pub const fn bits(self) -> u8 {
        self.bits
    }

    pub fn raise(&mut self, kind: InterruptKind) {
        self.bits |= kind.bit();
    }

    pub fn acknowledge(&mut self, kind: InterruptKind) {
        self.bits &= !kind.bit();
    }

    pub fn set_irq_line(&mut self, asserted: bool) {
        if asserted {
            self.bits |= IRQ_LINE;
        } else {
            self.bits &= !IRQ_LINE;
        }
    }

    pub fn is_pending(self, kind: InterruptKind) -> bool {
        match kind {
            InterruptKind::Irq => (self.bits & (PENDING_IRQ | IRQ_LINE)) != 0,
            other => (self.bits & other.bit()) != 0,
        }
    }

    /// Highest-priority interrupt that may be taken now. NMI > IRQ > Reset;
    /// IRQ is masked by the interrupt-disable flag.
    pub fn next(self, interrupt_disable: bool) -> Option<InterruptKind> {
        if self.is_pending(InterruptKind::Nmi) {
            Some(InterruptKind::Nmi)
        } else if !interrupt_disable && self.is_pending(InterruptKind::Irq) {
            Some(InterruptKind::Irq)
        } else if self.is_pending(InterruptKind::Reset) {
            Some(InterruptKind::Reset)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nmi_beats_irq_and_reset() {
        let mut pending = PendingInterrupts::default();
        pending.raise(InterruptKind::Reset);
        pending.raise(InterruptKind::Irq);
        pending.raise(InterruptKind::Nmi);
        assert_eq!(pending.next(false), Some(InterruptKind::Nmi));
        pending.acknowledge(InterruptKind::Nmi);
        assert_eq!(pending.next(false), Some(InterruptKind::Irq));
        assert_eq!(pending.next(true), Some(InterruptKind::Reset));
    }

    #[test]
    fn irq_line_is_level_sensitive() {
        let mut pending = PendingInterrupts::default();
        pending.set_irq_line(true);
        assert_eq!(pending.next(false), Some(InterruptKind::Irq));
        assert_eq!(pending.next(true), None);

        // Acknowledging the latched request does not drop a held line.
        pending.acknowledge(InterruptKind::Irq);
        assert!(pending.is_pending(InterruptKind::Irq));

        pending.set_irq_line(false);
        assert_eq!(pending.next(false), None);
    }

    #[test]
    fn bits_round_trip_through_raw_value() {
        let mut pending = PendingInterrupts::default();
        pending.raise(InterruptKind::Nmi);
        pending.set_irq_line(true);
        assert_eq!(PendingInterrupts::from_bits(pending.bits()), pending);
    }
}
