use std::collections::BTreeMap;

use crate::circuit::{Circuit, MeasurementLog};
use crate::detectors::DetectorBuilder;
use crate::error::{Error, Result};
use crate::noise::ErrorModel;
use crate::qubits::QubitArena;
use crate::surface::{
    EdgeSide, InitialState, MeasurementBasis, PhaseMarker, StabilizerRoundEngine, Surface,
    NUM_ROUND_PHASES,
};
use crate::surgery::{LatticeSurgery, SurgeryAxis};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PatchCoord {
    pub x: u32,
    pub y: u32,
}

impl PatchCoord {
    pub fn new(x: u32, y: u32) -> PatchCoord {
        PatchCoord { x, y }
    }

    fn right_neighbor(&self) -> PatchCoord {
        PatchCoord::new(self.x + 1, self.y)
    }

    fn top_neighbor(&self) -> PatchCoord {
        PatchCoord::new(self.x, self.y + 1)
    }
}

impl std::fmt::Display for PatchCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// A region currently driving its ancillas. At most one owner exists per
// physical patch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RegionKey {
    Patch(PatchCoord),
    Surgery(PatchCoord, PatchCoord),
}

impl RegionKey {
    fn involves(&self, coord: PatchCoord) -> bool {
        match self {
            RegionKey::Patch(c) => *c == coord,
            RegionKey::Surgery(a, b) => *a == coord || *b == coord,
        }
    }
}

/// Owns all patches and merges, the shared circuit and measurement logs,
/// and the active-region set, and drives rounds phase-synchronously
/// across every active region.
pub struct Experiment {
    surfaces: BTreeMap<PatchCoord, Surface>,
    surgeries: BTreeMap<(PatchCoord, PatchCoord), LatticeSurgery>,
    arena: QubitArena,
    circuit: Circuit,
    measurements: MeasurementLog,
    active: Vec<RegionKey>,
    error_model: ErrorModel,
    observable_count: u32,
}

impl Experiment {
    pub fn new(patches: &[(PatchCoord, u32)], error_model: ErrorModel) -> Result<Experiment> {
        let mut surfaces = BTreeMap::new();
        for (coord, dist) in patches {
            if surfaces.insert(*coord, Surface::new(*dist)?).is_some() {
                return Err(Error::Configuration(format!("patch {} is listed twice", coord)));
            }
        }
        let mut arena = QubitArena::new();
        for (coord, surface) in surfaces.iter_mut() {
            surface.allocate_qubits((coord.x, coord.y), &mut arena);
        }

        // Adjacent patches of equal distance share one boundary line, so
        // a future merge on that edge talks about the same qubits from
        // both sides.
        let coords: Vec<PatchCoord> = surfaces.keys().copied().collect();
        for coord in &coords {
            let dist = surfaces[coord].dist();
            let right = coord.right_neighbor();
            if surfaces.get(&right).map_or(false, |s| s.dist() == dist) {
                let line = surfaces[coord].edge_reserve(EdgeSide::Right).to_vec();
                surfaces.get_mut(&right).unwrap().set_edge_reserve(EdgeSide::Left, line);
            }
            let top = coord.top_neighbor();
            if surfaces.get(&top).map_or(false, |s| s.dist() == dist) {
                let line = surfaces[coord].edge_reserve(EdgeSide::Top).to_vec();
                surfaces.get_mut(&top).unwrap().set_edge_reserve(EdgeSide::Bottom, line);
            }
        }

        Ok(Experiment {
            surfaces,
            surgeries: BTreeMap::new(),
            arena,
            circuit: Circuit::new(),
            measurements: MeasurementLog::new(),
            active: Vec::new(),
            error_model,
            observable_count: 0,
        })
    }

    pub fn surface(&self, coord: PatchCoord) -> Result<&Surface> {
        self.surfaces
            .get(&coord)
            .ok_or_else(|| Error::Configuration(format!("there is no patch at {}", coord)))
    }

    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    pub fn measurements(&self) -> &MeasurementLog {
        &self.measurements
    }

    pub fn num_qubits(&self) -> usize {
        self.arena.num_qubits()
    }

    pub fn num_patches(&self) -> usize {
        self.surfaces.len()
    }

    pub fn observable_count(&self) -> u32 {
        self.observable_count
    }

    pub fn flip_orientation(&mut self, coord: PatchCoord) -> Result<()> {
        self.surface(coord)?;
        self.surfaces.get_mut(&coord).unwrap().flip_orientation();
        Ok(())
    }

    fn activate_patch(&mut self, coord: PatchCoord) {
        self.active.retain(|key| !matches!(key, RegionKey::Surgery(..)) || !key.involves(coord));
        let key = RegionKey::Patch(coord);
        if !self.active.contains(&key) {
            self.active.push(key);
        }
    }

    fn is_active_patch(&self, coord: PatchCoord) -> bool {
        self.active.contains(&RegionKey::Patch(coord))
    }

    /// Prepares the patch's data qubits in `state` and makes the patch an
    /// active region.
    pub fn initialize_surface(&mut self, coord: PatchCoord, state: InitialState) -> Result<()> {
        self.surface(coord)?;
        self.activate_patch(coord);
        log::info!("initializing patch {} in {:?}", coord, state);
        let surface = self.surfaces.get_mut(&coord).unwrap();
        surface.initialize(state, &mut self.circuit, &self.error_model)
    }

    /// One full stabilizer round: every active region runs phase k before
    /// any region runs phase k + 1, a TICK closes each phase, and the
    /// detector pass follows.
    pub fn stabilizer_round(&mut self) -> Result<()> {
        if self.active.is_empty() {
            return Err(Error::InvariantViolation(
                "stabilizer round requested with no active region".to_string(),
            ));
        }
        log::debug!("stabilizer round over {} active regions", self.active.len());
        let active = self.active.clone();
        for phase in 0..NUM_ROUND_PHASES {
            let mut engine = StabilizerRoundEngine {
                circuit: &mut self.circuit,
                measurements: &mut self.measurements,
                error_model: &self.error_model,
            };
            for key in &active {
                let lattice = match key {
                    RegionKey::Patch(coord) => self.surfaces[coord].lattice(),
                    RegionKey::Surgery(a, b) => self.surgeries[&(*a, *b)].lattice(),
                };
                engine.run_phase(lattice, phase)?;
            }
            self.circuit.tick();
        }
        for key in &active {
            let mut builder = DetectorBuilder::new(&mut self.circuit, &self.measurements);
            match key {
                RegionKey::Patch(coord) => {
                    builder.round_detectors_for_surface(self.surfaces.get_mut(coord).unwrap())?
                }
                RegionKey::Surgery(a, b) => builder
                    .round_detectors_for_surgery(self.surgeries.get_mut(&(*a, *b)).unwrap())?,
            }
        }
        Ok(())
    }

    /// Merges two adjacent patches. The merged region takes over both
    /// parents' ancillas starting with the next round.
    pub fn initialize_surgery(&mut self, first: PatchCoord, second: PatchCoord) -> Result<()> {
        let axis = if second == first.right_neighbor() {
            SurgeryAxis::Horizontal
        } else if second == first.top_neighbor() {
            SurgeryAxis::Vertical
        } else {
            return Err(Error::Configuration(format!(
                "patches {} and {} are not adjacent",
                first, second
            )));
        };
        self.surface(first)?;
        self.surface(second)?;
        for coord in [first, second] {
            if !self.is_active_patch(coord) {
                return Err(Error::Configuration(format!(
                    "patch {} is not an active region",
                    coord
                )));
            }
            if self.surfaces[&coord].marker() != PhaseMarker::Steady {
                return Err(Error::Configuration(format!(
                    "patch {} needs at least one steady stabilizer round before a merge",
                    coord
                )));
            }
        }
        let surgery = LatticeSurgery::new(&self.surfaces[&first], &self.surfaces[&second], axis)?;
        if surgery.lattice().active_ancillas().is_empty() {
            return Err(Error::InvariantViolation(
                "merged region has no active ancillas".to_string(),
            ));
        }
        log::info!(
            "merging patches {} and {} ({:?} {:?})",
            first,
            second,
            surgery.axis(),
            surgery.operation()
        );
        surgery.initialize_surgery_data(&mut self.circuit, &self.error_model);
        self.active.retain(|key| !key.involves(first) && !key.involves(second));
        self.active.push(RegionKey::Surgery(first, second));
        self.surgeries.insert((first, second), surgery);
        Ok(())
    }

    /// Measures the merge out: emits the joint-measurement observable,
    /// destroys the seam, and hands both patches back their ancillas with
    /// post-surgery detector rules armed.
    pub fn measure_surgery(&mut self, first: PatchCoord, second: PatchCoord) -> Result<()> {
        let key = RegionKey::Surgery(first, second);
        if !self.active.contains(&key) {
            return Err(Error::Configuration(format!(
                "there is no active merge between {} and {}",
                first, second
            )));
        }
        let surgery = &self.surgeries[&(first, second)];
        surgery.surgery_measurement(&mut self.circuit, &mut self.measurements, self.observable_count)?;
        self.observable_count += 1;
        let (first_edge, second_edge) = surgery.parent_edges();
        log::info!("splitting patches {} and {}", first, second);
        self.surgeries.remove(&(first, second));
        self.active.retain(|k| *k != key);
        self.surfaces
            .get_mut(&first)
            .unwrap()
            .set_marker(PhaseMarker::PostSurgeryEdge(first_edge));
        self.activate_patch(first);
        self.surfaces
            .get_mut(&second)
            .unwrap()
            .set_marker(PhaseMarker::PostSurgeryEdge(second_edge));
        self.activate_patch(second);
        Ok(())
    }

    /// Destructively measures a patch in `basis`, emitting its final
    /// detectors and one logical observable, and deactivates it.
    pub fn measure_surface(&mut self, coord: PatchCoord, basis: MeasurementBasis) -> Result<()> {
        self.surface(coord)?;
        if !self.is_active_patch(coord) {
            return Err(Error::Configuration(format!(
                "patch {} is not an active region",
                coord
            )));
        }
        if self.surfaces[&coord].marker() != PhaseMarker::Steady {
            return Err(Error::Configuration(format!(
                "patch {} needs a steady stabilizer round before its final measurement",
                coord
            )));
        }
        log::info!("measuring patch {} in {:?} basis", coord, basis);
        let surface = &self.surfaces[&coord];
        surface.measure(basis, &mut self.circuit, &mut self.measurements, &self.error_model);
        let mut builder = DetectorBuilder::new(&mut self.circuit, &self.measurements);
        builder.final_measurement_detectors(surface, basis)?;
        builder.surface_observable(surface, basis, self.observable_count)?;
        self.observable_count += 1;
        self.active.retain(|key| *key != RegionKey::Patch(coord));
        Ok(())
    }
}
