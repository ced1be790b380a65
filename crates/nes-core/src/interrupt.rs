//! Interrupt line shared between the units through the bus
//!
//! The PPU raises the vblank interrupt (NMI) and the APU drives the
//! level-sensitive IRQ input. Neither unit sees the CPU; the scheduler reads
//! this state between instructions.

/// Interrupt kinds serviced by the CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Non-maskable, raised at the start of vertical blank
    Nmi,
    /// Maskable, held by the APU frame counter or DMC
    Irq,
}

impl Interrupt {
    /// Address of the handler vector
    pub fn vector(self) -> u16 {
        match self {
            Interrupt::Nmi => 0xFFFA,
            Interrupt::Irq => 0xFFFE,
        }
    }
}

/// Pending/acknowledged interrupt state
#[derive(Debug, Clone, Default)]
pub struct InterruptLine {
    nmi_pending: bool,
    irq_level: bool,
    nmi_raised: u64,
}

impl InterruptLine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop pending inputs; the NMI count carries across resets
    pub fn clear(&mut self) {
        self.nmi_pending = false;
        self.irq_level = false;
    }

    /// Latch a vblank interrupt
    pub fn raise_nmi(&mut self) {
        if !self.nmi_pending {
            self.nmi_raised += 1;
        }
        self.nmi_pending = true;
    }

    /// Consume the pending NMI, returning whether one was latched
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_pending)
    }

    /// Drop a pending NMI without servicing it ($2002 read)
    pub fn acknowledge_nmi(&mut self) {
        self.nmi_pending = false;
    }

    pub fn nmi_pending(&self) -> bool {
        self.nmi_pending
    }

    /// Number of times the vblank interrupt has been asserted since power-on
    pub fn nmi_count(&self) -> u64 {
        self.nmi_raised
    }

    pub fn set_irq(&mut self, asserted: bool) {
        self.irq_level = asserted;
    }

    pub fn irq(&self) -> bool {
        self.irq_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nmi_latch_counts_edges() {
        let mut line = InterruptLine::new();
        line.raise_nmi();
        line.raise_nmi();
        assert_eq!(line.nmi_count(), 1);
        assert!(line.take_nmi());
        assert!(!line.take_nmi());

        line.raise_nmi();
        line.acknowledge_nmi();
        assert!(!line.nmi_pending());
        assert_eq!(line.nmi_count(), 2);
    }

    #[test]
    fn test_clear_keeps_nmi_count() {
        let mut line = InterruptLine::new();
        line.raise_nmi();
        line.set_irq(true);
        line.clear();
        assert!(!line.nmi_pending());
        assert!(!line.irq());
        assert_eq!(line.nmi_count(), 1);
    }

    #[test]
    fn test_vectors() {
        assert_eq!(Interrupt::Nmi.vector(), 0xFFFA);
        assert_eq!(Interrupt::Irq.vector(), 0xFFFE);
    }
}
