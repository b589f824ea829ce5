use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::circuit::{Circuit, GateKind, MeasurementLog};
use crate::error::{Error, Result};
use crate::noise::ErrorModel;
use crate::qubits::{Grid, Qubit, QubitArena, QubitRecord, QubitRole};

// Which checkerboard color carries which stabilizer type, named by the
// direction each logical operator runs across the patch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SurfaceOrientation {
    XVerticalZHorizontal,
    ZVerticalXHorizontal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitialState {
    ZPlus,
    ZMinus,
    XPlus,
    XMinus,
}

impl InitialState {
    pub fn basis(&self) -> MeasurementBasis {
        match self {
            InitialState::ZPlus | InitialState::ZMinus => MeasurementBasis::Z,
            InitialState::XPlus | InitialState::XMinus => MeasurementBasis::X,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MeasurementBasis {
    Z,
    X,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum EdgeSide {
    Left,
    Right,
    Top,
    Bottom,
}

/// Selects the detector rule applied to a region after each round.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PhaseMarker {
    FreshlyInitialized,
    Steady,
    PostSurgeryEdge(EdgeSide),
}

// The six stabilizer classes. The four mixed classes only ever appear on
// the seam of a merged region, where one side of a check couples in X
// and the other in Z.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum StabilizerGroup {
    X,
    Z,
    XLeftZRight,
    ZLeftXRight,
    ZTopXBottom,
    XTopZBottom,
}

impl StabilizerGroup {
    pub const ALL: [StabilizerGroup; 6] = [
        StabilizerGroup::X,
        StabilizerGroup::Z,
        StabilizerGroup::XLeftZRight,
        StabilizerGroup::ZLeftXRight,
        StabilizerGroup::ZTopXBottom,
        StabilizerGroup::XTopZBottom,
    ];

    pub fn plain(basis: MeasurementBasis) -> StabilizerGroup {
        match basis {
            MeasurementBasis::X => StabilizerGroup::X,
            MeasurementBasis::Z => StabilizerGroup::Z,
        }
    }

    /// Entangling gate used when a check in this group couples toward
    /// `direction`.
    pub fn gate_toward(&self, direction: Direction) -> GateKind {
        use Direction::*;
        let x_side = match self {
            StabilizerGroup::X => true,
            StabilizerGroup::Z => false,
            StabilizerGroup::XLeftZRight => matches!(direction, Nw | Sw),
            StabilizerGroup::ZLeftXRight => matches!(direction, Ne | Se),
            StabilizerGroup::ZTopXBottom => matches!(direction, Sw | Se),
            StabilizerGroup::XTopZBottom => matches!(direction, Nw | Ne),
        };
        if x_side {
            GateKind::Cx
        } else {
            GateKind::Cz
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Nw,
    Ne,
    Sw,
    Se,
}

impl Direction {
    // Per-round gate order. Odd-parity sites swap the middle layers so
    // that neighbouring checks never walk the same data qubit in the
    // same layer (hook errors stay uncorrelated).
    const EVEN_SITE_ORDER: [Direction; 4] = [Direction::Nw, Direction::Ne, Direction::Sw, Direction::Se];
    const ODD_SITE_ORDER: [Direction; 4] = [Direction::Nw, Direction::Sw, Direction::Ne, Direction::Se];

    pub fn for_layer(layer: usize, site_parity_odd: bool) -> Direction {
        if site_parity_odd {
            Direction::ODD_SITE_ORDER[layer]
        } else {
            Direction::EVEN_SITE_ORDER[layer]
        }
    }
}

/// Shared geometry of a region (a single patch or a merged pair): the
/// data and ancilla grids plus the stabilizer-group partition. An
/// ancilla belongs to at most one group; group membership is what makes
/// it active.
#[derive(Clone, Debug)]
pub struct CheckLattice {
    data_qubits: Grid<Qubit>,
    ancilla_qubits: Grid<Qubit>,
    groups: BTreeMap<StabilizerGroup, BTreeSet<Qubit>>,
    positions: HashMap<Qubit, (u32, u32)>,
}

impl CheckLattice {
    pub fn new(data_qubits: Grid<Qubit>, ancilla_qubits: Grid<Qubit>) -> CheckLattice {
        let mut positions = HashMap::new();
        for x in 0..ancilla_qubits.width() {
            for y in 0..ancilla_qubits.height() {
                positions.insert(ancilla_qubits[(x, y)], (x, y));
            }
        }
        let mut groups = BTreeMap::new();
        for group in StabilizerGroup::ALL {
            groups.insert(group, BTreeSet::new());
        }
        CheckLattice { data_qubits, ancilla_qubits, groups, positions }
    }

    #[allow(dead_code)]
    pub fn width(&self) -> u32 {
        self.data_qubits.width()
    }

    #[allow(dead_code)]
    pub fn height(&self) -> u32 {
        self.data_qubits.height()
    }

    pub fn data_qubits(&self) -> &Grid<Qubit> {
        &self.data_qubits
    }

    pub fn ancilla_qubits(&self) -> &Grid<Qubit> {
        &self.ancilla_qubits
    }

    pub fn group(&self, group: StabilizerGroup) -> &BTreeSet<Qubit> {
        &self.groups[&group]
    }

    pub fn group_of(&self, ancilla: Qubit) -> Option<StabilizerGroup> {
        StabilizerGroup::ALL
            .into_iter()
            .find(|g| self.groups[g].contains(&ancilla))
    }

    pub fn insert_into_group(&mut self, group: StabilizerGroup, ancilla: Qubit) {
        self.groups.get_mut(&group).unwrap().insert(ancilla);
    }

    pub fn move_to_group(&mut self, group: StabilizerGroup, ancilla: Qubit) {
        if let Some(current) = self.group_of(ancilla) {
            self.groups.get_mut(&current).unwrap().remove(&ancilla);
        }
        self.insert_into_group(group, ancilla);
    }

    pub fn swap_plain_groups(&mut self) {
        let x = self.groups.remove(&StabilizerGroup::X).unwrap();
        let z = self.groups.remove(&StabilizerGroup::Z).unwrap();
        self.groups.insert(StabilizerGroup::X, z);
        self.groups.insert(StabilizerGroup::Z, x);
    }

    /// All ancillas currently assigned to any group, ascending by id.
    pub fn active_ancillas(&self) -> Vec<Qubit> {
        let mut all = BTreeSet::new();
        for group in StabilizerGroup::ALL {
            all.extend(self.groups[&group].iter().copied());
        }
        all.into_iter().collect()
    }

    pub fn ancilla_position(&self, ancilla: Qubit) -> Result<(u32, u32)> {
        self.positions
            .get(&ancilla)
            .copied()
            .ok_or_else(|| Error::Geometry(format!("ancilla {} is not on this region's grid", ancilla)))
    }

    /// The data qubit reached from ancilla position `(x, y)` toward
    /// `direction`, if that cell is on the grid.
    pub fn data_neighbor(&self, (x, y): (u32, u32), direction: Direction) -> Option<Qubit> {
        let (dx, dy) = match direction {
            Direction::Sw => (x.checked_sub(1)?, y.checked_sub(1)?),
            Direction::Nw => (x.checked_sub(1)?, y),
            Direction::Ne => (x, y),
            Direction::Se => (x, y.checked_sub(1)?),
        };
        self.data_qubits.get(dx, dy).copied()
    }

    /// All in-bounds data neighbours of an ancilla, in NW, NE, SW, SE
    /// order.
    pub fn data_neighbors(&self, ancilla: Qubit) -> Result<Vec<Qubit>> {
        let position = self.ancilla_position(ancilla)?;
        let mut neighbors = Vec::new();
        for direction in [Direction::Nw, Direction::Ne, Direction::Sw, Direction::Se] {
            if let Some(q) = self.data_neighbor(position, direction) {
                neighbors.push(q);
            }
        }
        Ok(neighbors)
    }

    /// One two-qubit-gate layer for one group, as flattened
    /// (ancilla, data) pair lists split by gate kind.
    pub fn gate_layer(&self, layer: usize, group: StabilizerGroup) -> Result<(Vec<Qubit>, Vec<Qubit>)> {
        let mut cx = Vec::new();
        let mut cz = Vec::new();
        for ancilla in self.groups[&group].iter().copied() {
            let position = self.ancilla_position(ancilla)?;
            let odd = (position.0 + position.1) % 2 == 1;
            let direction = Direction::for_layer(layer, odd);
            let Some(data) = self.data_neighbor(position, direction) else {
                continue;
            };
            let batch = match group.gate_toward(direction) {
                GateKind::Cx => &mut cx,
                _ => &mut cz,
            };
            batch.push(ancilla);
            batch.push(data);
        }
        Ok((cx, cz))
    }
}

pub const NUM_ROUND_PHASES: usize = 8;

/// Emits one schedule phase of the stabilizer round for one region. The
/// orchestrator runs every active region through phase k before any
/// region starts phase k + 1.
pub struct StabilizerRoundEngine<'a> {
    pub circuit: &'a mut Circuit,
    pub measurements: &'a mut MeasurementLog,
    pub error_model: &'a ErrorModel,
}

impl StabilizerRoundEngine<'_> {
    pub fn run_phase(&mut self, lattice: &CheckLattice, phase: usize) -> Result<()> {
        let ancillas = lattice.active_ancillas();
        if ancillas.is_empty() {
            return Err(Error::InvariantViolation(
                "stabilizer round on a region with no active ancillas".to_string(),
            ));
        }
        match phase {
            0 => self.circuit.gate(GateKind::Reset, ancillas),
            1 | 6 => {
                self.circuit.gate(GateKind::Hadamard, ancillas.clone());
                self.error_model.single_qubit_error(self.circuit, &ancillas);
            }
            2..=5 => {
                for group in StabilizerGroup::ALL {
                    let (cx, cz) = lattice.gate_layer(phase - 2, group)?;
                    if !cx.is_empty() {
                        self.circuit.gate(GateKind::Cx, cx.clone());
                        self.error_model.two_qubit_error(self.circuit, &cx);
                    }
                    if !cz.is_empty() {
                        self.circuit.gate(GateKind::Cz, cz.clone());
                        self.error_model.two_qubit_error(self.circuit, &cz);
                    }
                }
            }
            7 => {
                self.error_model.measurement_error(self.circuit, &ancillas);
                self.circuit.gate(GateKind::Measure, ancillas.clone());
                for ancilla in ancillas {
                    self.measurements.record(ancilla);
                }
            }
            _ => {
                return Err(Error::InvariantViolation(format!(
                    "stabilizer round has no phase {}",
                    phase
                )))
            }
        }
        Ok(())
    }
}

/// One code patch of distance `dist`.
#[derive(Clone, Debug)]
pub struct Surface {
    dist: u32,
    orientation: SurfaceOrientation,
    initial_state: InitialState,
    marker: PhaseMarker,
    lattice: CheckLattice,
    edge_reserve: BTreeMap<EdgeSide, Vec<Qubit>>,
    allocated: bool,
}

impl Surface {
    pub fn new(dist: u32) -> Result<Surface> {
        if dist < 3 || dist % 2 == 0 {
            return Err(Error::Configuration(format!(
                "distance must be an odd integer of at least 3, but got {}",
                dist
            )));
        }
        let data = Grid::new_with_value(dist, dist, Qubit::default());
        let ancilla = Grid::new_with_value(dist + 1, dist + 1, Qubit::default());
        Ok(Surface {
            dist,
            orientation: SurfaceOrientation::XVerticalZHorizontal,
            initial_state: InitialState::ZPlus,
            marker: PhaseMarker::FreshlyInitialized,
            lattice: CheckLattice::new(data, ancilla),
            edge_reserve: BTreeMap::new(),
            allocated: false,
        })
    }

    pub fn dist(&self) -> u32 {
        self.dist
    }

    pub fn orientation(&self) -> SurfaceOrientation {
        self.orientation
    }

    pub fn initial_state(&self) -> InitialState {
        self.initial_state
    }

    pub fn marker(&self) -> PhaseMarker {
        self.marker
    }

    pub fn set_marker(&mut self, marker: PhaseMarker) {
        self.marker = marker;
    }

    pub fn lattice(&self) -> &CheckLattice {
        &self.lattice
    }

    pub fn edge_reserve(&self, side: EdgeSide) -> &[Qubit] {
        self.edge_reserve.get(&side).map_or(&[], |v| v.as_slice())
    }

    pub(crate) fn set_edge_reserve(&mut self, side: EdgeSide, qubits: Vec<Qubit>) {
        self.edge_reserve.insert(side, qubits);
    }

    // Boundary ancillas outside the alternating weight-2 pattern have no
    // check to measure and are dropped from every group.
    fn is_boundary_cut(x: u32, y: u32, dist: u32) -> bool {
        (x == 0 && y % 2 == 0)
            || (y == dist && x % 2 == 0)
            || (y == 0 && x % 2 == 1)
            || (x == dist && y % 2 == 1)
    }

    fn classify(x: u32, y: u32, orientation: SurfaceOrientation) -> StabilizerGroup {
        let even = (x + y) % 2 == 0;
        match orientation {
            SurfaceOrientation::ZVerticalXHorizontal => {
                if even {
                    StabilizerGroup::Z
                } else {
                    StabilizerGroup::X
                }
            }
            SurfaceOrientation::XVerticalZHorizontal => {
                if even {
                    StabilizerGroup::X
                } else {
                    StabilizerGroup::Z
                }
            }
        }
    }

    /// Assigns arena identities to every qubit of this patch. Invoking
    /// this again on an allocated patch changes nothing.
    pub fn allocate_qubits(&mut self, patch: (u32, u32), arena: &mut QubitArena) {
        if self.allocated {
            return;
        }
        let dist = self.dist;
        let mut data = Grid::new_with_value(dist, dist, Qubit::default());
        for x in 0..dist {
            for y in 0..dist {
                data[(x, y)] = arena.allocate(QubitRecord { patch, role: QubitRole::Data, x, y });
            }
        }
        let mut ancilla = Grid::new_with_value(dist + 1, dist + 1, Qubit::default());
        for x in 0..=dist {
            for y in 0..=dist {
                ancilla[(x, y)] =
                    arena.allocate(QubitRecord { patch, role: QubitRole::Ancilla, x, y });
            }
        }
        let mut lattice = CheckLattice::new(data, ancilla);
        for x in 0..=dist {
            for y in 0..=dist {
                if Self::is_boundary_cut(x, y, dist) {
                    continue;
                }
                let group = Self::classify(x, y, self.orientation);
                let qubit = lattice.ancilla_qubits()[(x, y)];
                lattice.insert_into_group(group, qubit);
            }
        }
        self.lattice = lattice;

        let mut right = Vec::with_capacity(dist as usize);
        for i in 0..dist {
            right.push(arena.allocate(QubitRecord {
                patch,
                role: QubitRole::SurgeryEdge,
                x: dist,
                y: i,
            }));
        }
        self.edge_reserve.insert(EdgeSide::Right, right);
        let mut top = Vec::with_capacity(dist as usize);
        for i in 0..dist {
            top.push(arena.allocate(QubitRecord {
                patch,
                role: QubitRole::SurgeryEdge,
                x: i,
                y: dist,
            }));
        }
        self.edge_reserve.insert(EdgeSide::Top, top);
        self.allocated = true;
    }

    /// Swaps the X and Z group contents and toggles the orientation flag
    /// without touching any qubit identity. Applying this twice is the
    /// identity.
    pub fn flip_orientation(&mut self) {
        self.orientation = match self.orientation {
            SurfaceOrientation::XVerticalZHorizontal => SurfaceOrientation::ZVerticalXHorizontal,
            SurfaceOrientation::ZVerticalXHorizontal => SurfaceOrientation::XVerticalZHorizontal,
        };
        self.lattice.swap_plain_groups();
    }

    pub fn data_qubits_row_major(&self) -> Vec<Qubit> {
        let mut qubits = Vec::with_capacity((self.dist * self.dist) as usize);
        for x in 0..self.dist {
            for y in 0..self.dist {
                qubits.push(self.lattice.data_qubits()[(x, y)]);
            }
        }
        qubits
    }

    /// Prepares every data qubit in `state` and marks the patch freshly
    /// initialized.
    pub fn initialize(
        &mut self,
        state: InitialState,
        circuit: &mut Circuit,
        error_model: &ErrorModel,
    ) -> Result<()> {
        if !self.allocated {
            return Err(Error::InvariantViolation(
                "cannot initialize a patch before qubit allocation".to_string(),
            ));
        }
        let data = self.data_qubits_row_major();
        circuit.gate(GateKind::Reset, data.clone());
        match state {
            InitialState::ZPlus => {}
            InitialState::ZMinus => circuit.gate(GateKind::PauliX, data.clone()),
            InitialState::XPlus => circuit.gate(GateKind::Hadamard, data.clone()),
            InitialState::XMinus => {
                circuit.gate(GateKind::PauliX, data.clone());
                circuit.gate(GateKind::Hadamard, data.clone());
            }
        }
        error_model.single_qubit_error(circuit, &data);
        self.initial_state = state;
        self.marker = PhaseMarker::FreshlyInitialized;
        Ok(())
    }

    /// Destructively measures every data qubit in `basis`, appending the
    /// outcomes to the measurement log.
    pub fn measure(
        &self,
        basis: MeasurementBasis,
        circuit: &mut Circuit,
        measurements: &mut MeasurementLog,
        error_model: &ErrorModel,
    ) {
        let data = self.data_qubits_row_major();
        if basis == MeasurementBasis::X {
            circuit.gate(GateKind::Hadamard, data.clone());
            error_model.single_qubit_error(circuit, &data);
            circuit.tick();
        }
        error_model.measurement_error(circuit, &data);
        circuit.gate(GateKind::Measure, data.clone());
        for qubit in data {
            measurements.record(qubit);
        }
    }
}
