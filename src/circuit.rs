use std::collections::HashMap;

use crate::qubits::Qubit;

// The instruction log uses stim's vocabulary: the external decoding-graph
// compiler consumes the text form produced by Display.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GateKind {
    Reset,
    Hadamard,
    PauliX,
    Measure,
    Cx,
    Cz,
}

impl GateKind {
    fn mnemonic(&self) -> &'static str {
        match self {
            GateKind::Reset => "R",
            GateKind::Hadamard => "H",
            GateKind::PauliX => "X",
            GateKind::Measure => "M",
            GateKind::Cx => "CX",
            GateKind::Cz => "CZ",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NoiseKind {
    Depolarize1,
    Depolarize2,
    XError,
}

impl NoiseKind {
    fn mnemonic(&self) -> &'static str {
        match self {
            NoiseKind::Depolarize1 => "DEPOLARIZE1",
            NoiseKind::Depolarize2 => "DEPOLARIZE2",
            NoiseKind::XError => "X_ERROR",
        }
    }
}

/// A backwards reference into the measurement record: `rec[-lookback]`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RecOffset {
    lookback: usize,
}

impl RecOffset {
    fn new(position: usize, log_len: usize) -> RecOffset {
        assert!(position < log_len);
        RecOffset { lookback: log_len - position }
    }
}

impl std::fmt::Display for RecOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "rec[-{}]", self.lookback)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Gate {
        kind: GateKind,
        targets: Vec<Qubit>,
    },
    Noise {
        kind: NoiseKind,
        probability: f64,
        targets: Vec<Qubit>,
    },
    /// Synchronization marker separating schedule phases.
    Tick,
    /// Asserts that the referenced outcomes have even parity absent error.
    Detector { targets: Vec<RecOffset> },
    /// Folds the referenced outcomes into logical observable `index`.
    ObservableInclude {
        index: u32,
        targets: Vec<RecOffset>,
    },
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Instruction::Gate { kind, targets } => {
                write!(f, "{}", kind.mnemonic())?;
                for q in targets {
                    write!(f, " {}", q)?;
                }
                Ok(())
            }
            Instruction::Noise { kind, probability, targets } => {
                write!(f, "{}({})", kind.mnemonic(), probability)?;
                for q in targets {
                    write!(f, " {}", q)?;
                }
                Ok(())
            }
            Instruction::Tick => write!(f, "TICK"),
            Instruction::Detector { targets } => {
                write!(f, "DETECTOR")?;
                for t in targets {
                    write!(f, " {}", t)?;
                }
                Ok(())
            }
            Instruction::ObservableInclude { index, targets } => {
                write!(f, "OBSERVABLE_INCLUDE({})", index)?;
                for t in targets {
                    write!(f, " {}", t)?;
                }
                Ok(())
            }
        }
    }
}

/// Append-only instruction log for one experiment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Circuit {
    instructions: Vec<Instruction>,
}

impl Circuit {
    pub fn new() -> Circuit {
        Circuit { instructions: Vec::new() }
    }

    pub fn gate(&mut self, kind: GateKind, targets: Vec<Qubit>) {
        self.instructions.push(Instruction::Gate { kind, targets });
    }

    pub fn noise(&mut self, kind: NoiseKind, probability: f64, targets: Vec<Qubit>) {
        self.instructions.push(Instruction::Noise { kind, probability, targets });
    }

    pub fn tick(&mut self) {
        self.instructions.push(Instruction::Tick);
    }

    pub fn detector(&mut self, targets: Vec<RecOffset>) {
        self.instructions.push(Instruction::Detector { targets });
    }

    pub fn observable_include(&mut self, index: u32, targets: Vec<RecOffset>) {
        self.instructions.push(Instruction::ObservableInclude { index, targets });
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn num_detectors(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| matches!(i, Instruction::Detector { .. }))
            .count()
    }

    pub fn num_observables(&self) -> usize {
        self.instructions
            .iter()
            .filter(|i| matches!(i, Instruction::ObservableInclude { .. }))
            .count()
    }

    pub fn num_measurements(&self) -> usize {
        self.instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Gate { kind: GateKind::Measure, targets } => Some(targets.len()),
                _ => None,
            })
            .sum()
    }
}

impl std::fmt::Display for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for instruction in &self.instructions {
            writeln!(f, "{}", instruction)?;
        }
        Ok(())
    }
}

/// Measurement history addressed per qubit. Detector and observable
/// construction only ever asks for the k-th most recent measurement of a
/// given qubit; absolute positions stay internal so that region
/// activation and deactivation cannot skew anyone's bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct MeasurementLog {
    total: usize,
    by_qubit: HashMap<Qubit, Vec<usize>>,
}

impl MeasurementLog {
    pub fn new() -> MeasurementLog {
        MeasurementLog { total: 0, by_qubit: HashMap::new() }
    }

    pub fn record(&mut self, qubit: Qubit) {
        self.by_qubit.entry(qubit).or_default().push(self.total);
        self.total += 1;
    }

    pub fn len(&self) -> usize {
        self.total
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    #[allow(dead_code)]
    pub fn count(&self, qubit: Qubit) -> usize {
        self.by_qubit.get(&qubit).map_or(0, |v| v.len())
    }

    /// Reference to the most recent measurement of `qubit`, valid until
    /// the next `record` call.
    pub fn most_recent(&self, qubit: Qubit) -> Option<RecOffset> {
        self.nth_most_recent(qubit, 0)
    }

    /// k = 0 is the most recent measurement, k = 1 the one before it.
    pub fn nth_most_recent(&self, qubit: Qubit, k: usize) -> Option<RecOffset> {
        let positions = self.by_qubit.get(&qubit)?;
        if k >= positions.len() {
            return None;
        }
        Some(RecOffset::new(positions[positions.len() - 1 - k], self.total))
    }

    /// Reference to the first measurement ever taken of `qubit`.
    pub fn earliest(&self, qubit: Qubit) -> Option<RecOffset> {
        let positions = self.by_qubit.get(&qubit)?;
        Some(RecOffset::new(positions[0], self.total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(index: u32) -> Qubit {
        Qubit::new(index)
    }

    #[test]
    fn test_gate_display() {
        let mut circuit = Circuit::new();
        circuit.gate(GateKind::Cx, vec![q(3), q(0), q(4), q(1)]);
        circuit.gate(GateKind::Reset, vec![q(9)]);
        circuit.tick();
        assert_eq!(circuit.to_string(), "CX 3 0 4 1\nR 9\nTICK\n");
    }

    #[test]
    fn test_noise_display() {
        let mut circuit = Circuit::new();
        circuit.noise(NoiseKind::Depolarize1, 0.001, vec![q(0), q(1)]);
        circuit.noise(NoiseKind::XError, 0.005, vec![q(2)]);
        assert_eq!(circuit.to_string(), "DEPOLARIZE1(0.001) 0 1\nX_ERROR(0.005) 2\n");
    }

    #[test]
    fn test_detector_and_observable_display() {
        let mut log = MeasurementLog::new();
        log.record(q(5));
        log.record(q(6));
        log.record(q(5));
        let mut circuit = Circuit::new();
        circuit.detector(vec![
            log.most_recent(q(5)).unwrap(),
            log.nth_most_recent(q(5), 1).unwrap(),
        ]);
        circuit.observable_include(2, vec![log.most_recent(q(6)).unwrap()]);
        assert_eq!(
            circuit.to_string(),
            "DETECTOR rec[-1] rec[-3]\nOBSERVABLE_INCLUDE(2) rec[-2]\n"
        );
    }

    #[test]
    fn test_measurement_log_queries() {
        let mut log = MeasurementLog::new();
        assert!(log.is_empty());
        assert_eq!(log.most_recent(q(0)), None);

        log.record(q(0));
        log.record(q(1));
        log.record(q(0));
        log.record(q(2));

        assert_eq!(log.len(), 4);
        assert_eq!(log.count(q(0)), 2);
        assert_eq!(log.count(q(1)), 1);
        assert_eq!(log.count(q(9)), 0);

        assert_eq!(log.most_recent(q(0)), Some(RecOffset { lookback: 2 }));
        assert_eq!(log.nth_most_recent(q(0), 1), Some(RecOffset { lookback: 4 }));
        assert_eq!(log.nth_most_recent(q(0), 2), None);
        assert_eq!(log.earliest(q(0)), Some(RecOffset { lookback: 4 }));
        assert_eq!(log.most_recent(q(2)), Some(RecOffset { lookback: 1 }));
    }

    #[test]
    fn test_counters() {
        let mut circuit = Circuit::new();
        circuit.gate(GateKind::Measure, vec![q(0), q(1), q(2)]);
        circuit.detector(vec![]);
        circuit.detector(vec![]);
        circuit.observable_include(0, vec![]);
        assert_eq!(circuit.num_measurements(), 3);
        assert_eq!(circuit.num_detectors(), 2);
        assert_eq!(circuit.num_observables(), 1);
    }
}
