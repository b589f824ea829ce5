use crate::circuit::{Circuit, GateKind, MeasurementLog};
use crate::error::{Error, Result};
use crate::noise::ErrorModel;
use crate::qubits::{Grid, Qubit};
use crate::surface::{
    CheckLattice, EdgeSide, MeasurementBasis, PhaseMarker, StabilizerGroup, Surface,
    SurfaceOrientation,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SurgeryAxis {
    /// Second patch to the right of the first; the seam is a column.
    Horizontal,
    /// Second patch above the first; the seam is a row.
    Vertical,
}

/// The joint logical measurement a merge performs, named by the basis
/// each patch exposes on the shared edge.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SurgeryOperation {
    Zz,
    Xz,
    Zx,
    Xx,
}

impl SurgeryOperation {
    pub fn from_bases(first: MeasurementBasis, second: MeasurementBasis) -> SurgeryOperation {
        use MeasurementBasis::*;
        match (first, second) {
            (Z, Z) => SurgeryOperation::Zz,
            (X, Z) => SurgeryOperation::Xz,
            (Z, X) => SurgeryOperation::Zx,
            (X, X) => SurgeryOperation::Xx,
        }
    }

    pub fn first_basis(&self) -> MeasurementBasis {
        match self {
            SurgeryOperation::Zz | SurgeryOperation::Zx => MeasurementBasis::Z,
            SurgeryOperation::Xz | SurgeryOperation::Xx => MeasurementBasis::X,
        }
    }

    pub fn second_basis(&self) -> MeasurementBasis {
        match self {
            SurgeryOperation::Zz | SurgeryOperation::Xz => MeasurementBasis::Z,
            SurgeryOperation::Zx | SurgeryOperation::Xx => MeasurementBasis::X,
        }
    }

    // The seam data qubits are prepared (and read out) in the X basis
    // when the first patch's seam stabilizers are Z checks, so their
    // fresh eigenstate never disturbs the extended checks.
    fn rotates_seam_qubits(&self) -> bool {
        self.first_basis() == MeasurementBasis::Z
    }
}

/// The stabilizer basis a patch exposes on the edge crossed by `axis`.
pub fn seam_basis(orientation: SurfaceOrientation, axis: SurgeryAxis) -> MeasurementBasis {
    match (axis, orientation) {
        (SurgeryAxis::Horizontal, SurfaceOrientation::XVerticalZHorizontal) => MeasurementBasis::X,
        (SurgeryAxis::Horizontal, SurfaceOrientation::ZVerticalXHorizontal) => MeasurementBasis::Z,
        (SurgeryAxis::Vertical, SurfaceOrientation::XVerticalZHorizontal) => MeasurementBasis::Z,
        (SurgeryAxis::Vertical, SurfaceOrientation::ZVerticalXHorizontal) => MeasurementBasis::X,
    }
}

/// Two same-distance patches merged across a shared edge into one
/// region. The merged region owns copies of the parents' grids and
/// groups; the parents themselves stay untouched and take over again
/// once the surgery is measured out.
#[derive(Clone, Debug)]
pub struct LatticeSurgery {
    axis: SurgeryAxis,
    operation: SurgeryOperation,
    lattice: CheckLattice,
    surgery_data_qubits: Vec<Qubit>,
    seam_ancillas: Vec<Qubit>,
    marker: PhaseMarker,
}

impl LatticeSurgery {
    pub fn new(first: &Surface, second: &Surface, axis: SurgeryAxis) -> Result<LatticeSurgery> {
        if first.dist() != second.dist() {
            return Err(Error::Configuration(format!(
                "cannot merge patches of distance {} and {}",
                first.dist(),
                second.dist()
            )));
        }
        let dist = first.dist();
        let operation = SurgeryOperation::from_bases(
            seam_basis(first.orientation(), axis),
            seam_basis(second.orientation(), axis),
        );
        let surgery_data_qubits = match axis {
            SurgeryAxis::Horizontal => first.edge_reserve(EdgeSide::Right).to_vec(),
            SurgeryAxis::Vertical => first.edge_reserve(EdgeSide::Top).to_vec(),
        };
        if surgery_data_qubits.len() != dist as usize {
            return Err(Error::Geometry(format!(
                "seam reserve holds {} qubits for a distance-{} merge",
                surgery_data_qubits.len(),
                dist
            )));
        }

        let mut lattice = match axis {
            SurgeryAxis::Horizontal => {
                Self::merge_grids_horizontally(first, second, &surgery_data_qubits, dist)
            }
            SurgeryAxis::Vertical => {
                Self::merge_grids_vertically(first, second, &surgery_data_qubits, dist)
            }
        };
        for group in [StabilizerGroup::X, StabilizerGroup::Z] {
            for qubit in first.lattice().group(group).iter().chain(second.lattice().group(group)) {
                lattice.insert_into_group(group, *qubit);
            }
        }

        let seam_ancillas = match axis {
            SurgeryAxis::Horizontal => Self::assign_horizontal_seam(&mut lattice, operation, dist),
            SurgeryAxis::Vertical => Self::assign_vertical_seam(&mut lattice, operation, dist),
        };

        Ok(LatticeSurgery {
            axis,
            operation,
            lattice,
            surgery_data_qubits,
            seam_ancillas,
            marker: PhaseMarker::FreshlyInitialized,
        })
    }

    fn merge_grids_horizontally(
        first: &Surface,
        second: &Surface,
        seam: &[Qubit],
        dist: u32,
    ) -> CheckLattice {
        let mut data = Grid::new_with_value(2 * dist + 1, dist, Qubit::default());
        for x in 0..dist {
            for y in 0..dist {
                data[(x, y)] = first.lattice().data_qubits()[(x, y)];
                data[(dist + 1 + x, y)] = second.lattice().data_qubits()[(x, y)];
            }
        }
        for y in 0..dist {
            data[(dist, y)] = seam[y as usize];
        }
        let mut ancilla = Grid::new_with_value(2 * dist + 2, dist + 1, Qubit::default());
        for x in 0..=dist {
            for y in 0..=dist {
                ancilla[(x, y)] = first.lattice().ancilla_qubits()[(x, y)];
                ancilla[(dist + 1 + x, y)] = second.lattice().ancilla_qubits()[(x, y)];
            }
        }
        CheckLattice::new(data, ancilla)
    }

    fn merge_grids_vertically(
        first: &Surface,
        second: &Surface,
        seam: &[Qubit],
        dist: u32,
    ) -> CheckLattice {
        let mut data = Grid::new_with_value(dist, 2 * dist + 1, Qubit::default());
        for x in 0..dist {
            for y in 0..dist {
                data[(x, y)] = first.lattice().data_qubits()[(x, y)];
                data[(x, dist + 1 + y)] = second.lattice().data_qubits()[(x, y)];
            }
        }
        for x in 0..dist {
            data[(x, dist)] = seam[x as usize];
        }
        let mut ancilla = Grid::new_with_value(dist + 1, 2 * dist + 2, Qubit::default());
        for x in 0..=dist {
            for y in 0..=dist {
                ancilla[(x, y)] = first.lattice().ancilla_qubits()[(x, y)];
                ancilla[(x, dist + 1 + y)] = second.lattice().ancilla_qubits()[(x, y)];
            }
        }
        CheckLattice::new(data, ancilla)
    }

    // Activates the previously dangling boundary checks along the seam
    // and re-files the second patch's existing boundary checks when the
    // two sides couple in different bases. The first patch's existing
    // boundary checks keep their basis; they simply grow across the seam.
    fn assign_horizontal_seam(
        lattice: &mut CheckLattice,
        operation: SurgeryOperation,
        dist: u32,
    ) -> Vec<Qubit> {
        let mut seam = Vec::new();
        let first_group = StabilizerGroup::plain(operation.first_basis());
        for y in (1..=dist).step_by(2) {
            let qubit = lattice.ancilla_qubits()[(dist, y)];
            lattice.insert_into_group(first_group, qubit);
            seam.push(qubit);
        }
        let second_group = match operation {
            SurgeryOperation::Zz | SurgeryOperation::Xx => {
                StabilizerGroup::plain(operation.second_basis())
            }
            SurgeryOperation::Xz => StabilizerGroup::XLeftZRight,
            SurgeryOperation::Zx => StabilizerGroup::ZLeftXRight,
        };
        for y in (0..=dist).step_by(2) {
            let qubit = lattice.ancilla_qubits()[(dist + 1, y)];
            lattice.insert_into_group(second_group, qubit);
            seam.push(qubit);
        }
        let refiled_group = match operation {
            SurgeryOperation::Xz => Some(StabilizerGroup::ZLeftXRight),
            SurgeryOperation::Zx => Some(StabilizerGroup::XLeftZRight),
            _ => None,
        };
        if let Some(group) = refiled_group {
            for y in (1..dist).step_by(2) {
                let qubit = lattice.ancilla_qubits()[(dist + 1, y)];
                if lattice.group_of(qubit).is_some() {
                    lattice.move_to_group(group, qubit);
                }
            }
        }
        seam
    }

    fn assign_vertical_seam(
        lattice: &mut CheckLattice,
        operation: SurgeryOperation,
        dist: u32,
    ) -> Vec<Qubit> {
        let mut seam = Vec::new();
        let first_group = StabilizerGroup::plain(operation.first_basis());
        for x in (0..=dist).step_by(2) {
            let qubit = lattice.ancilla_qubits()[(x, dist)];
            lattice.insert_into_group(first_group, qubit);
            seam.push(qubit);
        }
        let second_group = match operation {
            SurgeryOperation::Zz | SurgeryOperation::Xx => {
                StabilizerGroup::plain(operation.second_basis())
            }
            SurgeryOperation::Xz => StabilizerGroup::ZTopXBottom,
            SurgeryOperation::Zx => StabilizerGroup::XTopZBottom,
        };
        for x in (1..=dist).step_by(2) {
            let qubit = lattice.ancilla_qubits()[(x, dist + 1)];
            lattice.insert_into_group(second_group, qubit);
            seam.push(qubit);
        }
        let refiled_group = match operation {
            SurgeryOperation::Xz => Some(StabilizerGroup::XTopZBottom),
            SurgeryOperation::Zx => Some(StabilizerGroup::ZTopXBottom),
            _ => None,
        };
        if let Some(group) = refiled_group {
            for x in (2..dist).step_by(2) {
                let qubit = lattice.ancilla_qubits()[(x, dist + 1)];
                if lattice.group_of(qubit).is_some() {
                    lattice.move_to_group(group, qubit);
                }
            }
        }
        seam
    }

    pub fn axis(&self) -> SurgeryAxis {
        self.axis
    }

    pub fn operation(&self) -> SurgeryOperation {
        self.operation
    }

    pub fn lattice(&self) -> &CheckLattice {
        &self.lattice
    }

    pub fn surgery_data_qubits(&self) -> &[Qubit] {
        &self.surgery_data_qubits
    }

    /// The checks created by the merge, in seam order. Their first
    /// outcomes are individually random; their product is the joint
    /// logical measurement.
    pub fn seam_ancillas(&self) -> &[Qubit] {
        &self.seam_ancillas
    }

    pub fn marker(&self) -> PhaseMarker {
        self.marker
    }

    pub fn set_marker(&mut self, marker: PhaseMarker) {
        self.marker = marker;
    }

    /// The edge of each parent that the seam touches: (first, second).
    pub fn parent_edges(&self) -> (EdgeSide, EdgeSide) {
        match self.axis {
            SurgeryAxis::Horizontal => (EdgeSide::Right, EdgeSide::Left),
            SurgeryAxis::Vertical => (EdgeSide::Top, EdgeSide::Bottom),
        }
    }

    /// Prepares the seam data qubits in the eigenbasis the extended
    /// checks expect.
    pub fn initialize_surgery_data(&self, circuit: &mut Circuit, error_model: &ErrorModel) {
        circuit.gate(GateKind::Reset, self.surgery_data_qubits.clone());
        if self.operation.rotates_seam_qubits() {
            circuit.gate(GateKind::Hadamard, self.surgery_data_qubits.clone());
        }
        error_model.single_qubit_error(circuit, &self.surgery_data_qubits);
    }

    /// Emits the joint-measurement observable from the seam checks' most
    /// recent outcomes, then destructively measures the seam data qubits.
    pub fn surgery_measurement(
        &self,
        circuit: &mut Circuit,
        measurements: &mut MeasurementLog,
        observable_index: u32,
    ) -> Result<()> {
        let mut targets = Vec::with_capacity(self.seam_ancillas.len());
        for ancilla in &self.seam_ancillas {
            let target = measurements.most_recent(*ancilla).ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "seam check {} was never measured; run a stabilizer round before measuring the surgery",
                    ancilla
                ))
            })?;
            targets.push(target);
        }
        circuit.observable_include(observable_index, targets);
        if self.operation.rotates_seam_qubits() {
            circuit.gate(GateKind::Hadamard, self.surgery_data_qubits.clone());
        }
        circuit.gate(GateKind::Measure, self.surgery_data_qubits.clone());
        for qubit in &self.surgery_data_qubits {
            measurements.record(*qubit);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::Instruction;
    use crate::qubits::QubitArena;

    fn patch_pair(dist: u32, flip_first: bool, flip_second: bool) -> (Surface, Surface) {
        let mut arena = QubitArena::new();
        let mut first = Surface::new(dist).unwrap();
        first.allocate_qubits((0, 0), &mut arena);
        let mut second = Surface::new(dist).unwrap();
        second.allocate_qubits((1, 0), &mut arena);
        // Adjacent patches share one reserve line.
        second.set_edge_reserve(EdgeSide::Left, first.edge_reserve(EdgeSide::Right).to_vec());
        if flip_first {
            first.flip_orientation();
        }
        if flip_second {
            second.flip_orientation();
        }
        (first, second)
    }

    #[test]
    fn test_operation_table() {
        use SurfaceOrientation::*;
        let cases = [
            (XVerticalZHorizontal, XVerticalZHorizontal, SurgeryAxis::Horizontal, SurgeryOperation::Xx),
            (ZVerticalXHorizontal, ZVerticalXHorizontal, SurgeryAxis::Horizontal, SurgeryOperation::Zz),
            (ZVerticalXHorizontal, XVerticalZHorizontal, SurgeryAxis::Horizontal, SurgeryOperation::Zx),
            (XVerticalZHorizontal, ZVerticalXHorizontal, SurgeryAxis::Horizontal, SurgeryOperation::Xz),
            (XVerticalZHorizontal, XVerticalZHorizontal, SurgeryAxis::Vertical, SurgeryOperation::Zz),
            (ZVerticalXHorizontal, ZVerticalXHorizontal, SurgeryAxis::Vertical, SurgeryOperation::Xx),
        ];
        for (first, second, axis, expected) in cases {
            let operation =
                SurgeryOperation::from_bases(seam_basis(first, axis), seam_basis(second, axis));
            assert_eq!(operation, expected, "{:?} {:?} {:?}", first, second, axis);
        }
    }

    #[test]
    fn test_rejects_mismatched_distances() {
        let mut arena = QubitArena::new();
        let mut first = Surface::new(3).unwrap();
        first.allocate_qubits((0, 0), &mut arena);
        let mut second = Surface::new(5).unwrap();
        second.allocate_qubits((1, 0), &mut arena);
        let result = LatticeSurgery::new(&first, &second, SurgeryAxis::Horizontal);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_horizontal_merge_geometry() {
        let (first, second) = patch_pair(3, true, true);
        let surgery = LatticeSurgery::new(&first, &second, SurgeryAxis::Horizontal).unwrap();
        assert_eq!(surgery.operation(), SurgeryOperation::Zz);
        assert_eq!(surgery.lattice().width(), 7);
        assert_eq!(surgery.lattice().height(), 3);

        // The seam data column is the first patch's right reserve line.
        for y in 0..3 {
            assert_eq!(
                surgery.lattice().data_qubits()[(3, y)],
                first.edge_reserve(EdgeSide::Right)[y as usize]
            );
        }
        // The second patch's cells keep their identities, shifted right.
        assert_eq!(
            surgery.lattice().data_qubits()[(4, 0)],
            second.lattice().data_qubits()[(0, 0)]
        );
        assert_eq!(
            surgery.lattice().ancilla_qubits()[(4, 1)],
            second.lattice().ancilla_qubits()[(0, 1)]
        );
    }

    #[test]
    fn test_zz_merge_activates_seam_checks_as_z() {
        let (first, second) = patch_pair(3, true, true);
        let surgery = LatticeSurgery::new(&first, &second, SurgeryAxis::Horizontal).unwrap();
        let lattice = surgery.lattice();

        let seam: Vec<Qubit> = surgery.seam_ancillas().to_vec();
        assert_eq!(seam.len(), 4);
        assert_eq!(seam[0], lattice.ancilla_qubits()[(3, 1)]);
        assert_eq!(seam[1], lattice.ancilla_qubits()[(3, 3)]);
        assert_eq!(seam[2], lattice.ancilla_qubits()[(4, 0)]);
        assert_eq!(seam[3], lattice.ancilla_qubits()[(4, 2)]);
        for qubit in &seam {
            assert_eq!(lattice.group_of(*qubit), Some(StabilizerGroup::Z));
        }
        // 8 per patch plus the four seam checks.
        assert_eq!(lattice.active_ancillas().len(), 20);
    }

    #[test]
    fn test_mixed_merge_uses_mixed_groups() {
        // First patch flipped (Z on the seam), second in the default
        // orientation (X on the seam): a ZX merge.
        let (first, second) = patch_pair(3, true, false);
        let surgery = LatticeSurgery::new(&first, &second, SurgeryAxis::Horizontal).unwrap();
        assert_eq!(surgery.operation(), SurgeryOperation::Zx);
        let lattice = surgery.lattice();

        // First-side seam checks carry the first patch's seam basis.
        assert_eq!(
            lattice.group_of(lattice.ancilla_qubits()[(3, 1)]),
            Some(StabilizerGroup::Z)
        );
        // Second-side seam checks couple Z toward the seam, X into the
        // second patch.
        assert_eq!(
            lattice.group_of(lattice.ancilla_qubits()[(4, 0)]),
            Some(StabilizerGroup::ZLeftXRight)
        );
        // The second patch's existing boundary checks are re-filed so
        // they keep their own basis inside the patch and couple to the
        // seam qubits in the seam basis.
        assert_eq!(
            lattice.group_of(lattice.ancilla_qubits()[(4, 1)]),
            Some(StabilizerGroup::XLeftZRight)
        );
    }

    #[test]
    fn test_vertical_merge_geometry() {
        let mut arena = QubitArena::new();
        let mut first = Surface::new(3).unwrap();
        first.allocate_qubits((0, 0), &mut arena);
        let mut second = Surface::new(3).unwrap();
        second.allocate_qubits((0, 1), &mut arena);
        second.set_edge_reserve(EdgeSide::Bottom, first.edge_reserve(EdgeSide::Top).to_vec());

        let surgery = LatticeSurgery::new(&first, &second, SurgeryAxis::Vertical).unwrap();
        assert_eq!(surgery.operation(), SurgeryOperation::Zz);
        assert_eq!(surgery.lattice().width(), 3);
        assert_eq!(surgery.lattice().height(), 7);
        for x in 0..3 {
            assert_eq!(
                surgery.lattice().data_qubits()[(x, 3)],
                first.edge_reserve(EdgeSide::Top)[x as usize]
            );
        }
        let seam = surgery.seam_ancillas();
        assert_eq!(seam.len(), 4);
        assert_eq!(seam[0], surgery.lattice().ancilla_qubits()[(0, 3)]);
        assert_eq!(seam[1], surgery.lattice().ancilla_qubits()[(2, 3)]);
        assert_eq!(seam[2], surgery.lattice().ancilla_qubits()[(1, 4)]);
        assert_eq!(seam[3], surgery.lattice().ancilla_qubits()[(3, 4)]);
        for qubit in seam {
            assert_eq!(surgery.lattice().group_of(*qubit), Some(StabilizerGroup::Z));
        }
    }

    #[test]
    fn test_initialize_surgery_data_rotates_for_z_seam() {
        let (first, second) = patch_pair(3, true, true);
        let surgery = LatticeSurgery::new(&first, &second, SurgeryAxis::Horizontal).unwrap();
        let mut circuit = Circuit::new();
        surgery.initialize_surgery_data(&mut circuit, &ErrorModel::None);
        assert!(matches!(
            &circuit.instructions()[0],
            Instruction::Gate { kind: GateKind::Reset, targets } if targets.len() == 3
        ));
        assert!(matches!(
            &circuit.instructions()[1],
            Instruction::Gate { kind: GateKind::Hadamard, targets } if targets.len() == 3
        ));
    }

    #[test]
    fn test_initialize_surgery_data_keeps_z_for_x_seam() {
        let (first, second) = patch_pair(3, false, false);
        let surgery = LatticeSurgery::new(&first, &second, SurgeryAxis::Horizontal).unwrap();
        assert_eq!(surgery.operation(), SurgeryOperation::Xx);
        let mut circuit = Circuit::new();
        surgery.initialize_surgery_data(&mut circuit, &ErrorModel::None);
        assert_eq!(circuit.instructions().len(), 1);
    }

    #[test]
    fn test_surgery_measurement_requires_a_round() {
        let (first, second) = patch_pair(3, true, true);
        let surgery = LatticeSurgery::new(&first, &second, SurgeryAxis::Horizontal).unwrap();
        let mut circuit = Circuit::new();
        let mut measurements = MeasurementLog::new();
        let result = surgery.surgery_measurement(&mut circuit, &mut measurements, 0);
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
        assert!(circuit.instructions().is_empty());
    }

    #[test]
    fn test_surgery_measurement_emits_observable_then_measures_seam() {
        let (first, second) = patch_pair(3, true, true);
        let surgery = LatticeSurgery::new(&first, &second, SurgeryAxis::Horizontal).unwrap();
        let mut circuit = Circuit::new();
        let mut measurements = MeasurementLog::new();
        for ancilla in surgery.lattice().active_ancillas() {
            measurements.record(ancilla);
        }
        surgery.surgery_measurement(&mut circuit, &mut measurements, 5).unwrap();

        assert!(matches!(
            &circuit.instructions()[0],
            Instruction::ObservableInclude { index: 5, targets } if targets.len() == 4
        ));
        assert!(matches!(
            &circuit.instructions()[1],
            Instruction::Gate { kind: GateKind::Hadamard, .. }
        ));
        assert!(matches!(
            &circuit.instructions()[2],
            Instruction::Gate { kind: GateKind::Measure, targets } if targets.len() == 3
        ));
        assert_eq!(measurements.count(surgery.surgery_data_qubits()[0]), 1);
    }
}
