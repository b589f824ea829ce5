use std::collections::BTreeSet;

use crate::circuit::{Circuit, MeasurementLog, RecOffset};
use crate::error::{Error, Result};
use crate::qubits::Qubit;
use crate::surface::{
    EdgeSide, MeasurementBasis, PhaseMarker, StabilizerGroup, Surface, SurfaceOrientation,
};
use crate::surgery::LatticeSurgery;

/// Translates measurement history into detector and observable
/// instructions. Invoked once per region after each full round, and once
/// more when a region is measured out.
pub struct DetectorBuilder<'a> {
    circuit: &'a mut Circuit,
    measurements: &'a MeasurementLog,
}

fn logical_runs_vertically(orientation: SurfaceOrientation, basis: MeasurementBasis) -> bool {
    matches!(
        (orientation, basis),
        (SurfaceOrientation::XVerticalZHorizontal, MeasurementBasis::X)
            | (SurfaceOrientation::ZVerticalXHorizontal, MeasurementBasis::Z)
    )
}

impl<'a> DetectorBuilder<'a> {
    pub fn new(circuit: &'a mut Circuit, measurements: &'a MeasurementLog) -> DetectorBuilder<'a> {
        DetectorBuilder { circuit, measurements }
    }

    fn most_recent(&self, qubit: Qubit) -> Result<RecOffset> {
        self.measurements.most_recent(qubit).ok_or_else(|| {
            Error::InvariantViolation(format!("qubit {} has no measurement on record", qubit))
        })
    }

    fn nth_most_recent(&self, qubit: Qubit, k: usize) -> Result<RecOffset> {
        self.measurements.nth_most_recent(qubit, k).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "qubit {} has fewer than {} measurements on record",
                qubit,
                k + 1
            ))
        })
    }

    // The steady-state check: two consecutive outcomes of one ancilla
    // must agree.
    fn consecutive_round_detector(&mut self, ancilla: Qubit) -> Result<()> {
        let targets = vec![self.most_recent(ancilla)?, self.nth_most_recent(ancilla, 1)?];
        self.circuit.detector(targets);
        Ok(())
    }

    pub fn round_detectors_for_surface(&mut self, surface: &mut Surface) -> Result<()> {
        match surface.marker() {
            PhaseMarker::FreshlyInitialized => {
                // Only the checks matching the prepared basis have a
                // known eigenvalue after one round.
                let group = StabilizerGroup::plain(surface.initial_state().basis());
                for ancilla in surface.lattice().group(group).iter().copied() {
                    let target = self.most_recent(ancilla)?;
                    self.circuit.detector(vec![target]);
                }
                surface.set_marker(PhaseMarker::Steady);
            }
            PhaseMarker::Steady => {
                for ancilla in surface.lattice().active_ancillas() {
                    self.consecutive_round_detector(ancilla)?;
                }
            }
            PhaseMarker::PostSurgeryEdge(edge) => {
                self.post_surgery_detectors(surface, edge)?;
                surface.set_marker(PhaseMarker::Steady);
            }
        }
        Ok(())
    }

    // After a merge is measured out, the checks on the dissolved seam
    // shrink back to their weight-2 form. Their outcome changes by the
    // product of the two adjacent seam data qubits' final measurements,
    // so the consecutive-round check gains those two references.
    fn post_surgery_detectors(&mut self, surface: &Surface, edge: EdgeSide) -> Result<()> {
        let dist = surface.dist();
        let reserve = surface.edge_reserve(edge);
        if reserve.is_empty() {
            return Err(Error::InvariantViolation(format!(
                "patch has no seam reserve on its {:?} edge",
                edge
            )));
        }
        for ancilla in surface.lattice().active_ancillas() {
            let (x, y) = surface.lattice().ancilla_position(ancilla)?;
            let on_edge = match edge {
                EdgeSide::Left => x == 0,
                EdgeSide::Right => x == dist,
                EdgeSide::Bottom => y == 0,
                EdgeSide::Top => y == dist,
            };
            if !on_edge {
                self.consecutive_round_detector(ancilla)?;
                continue;
            }
            let k = match edge {
                EdgeSide::Left | EdgeSide::Right => y as usize,
                EdgeSide::Top | EdgeSide::Bottom => x as usize,
            };
            if k == 0 || k >= reserve.len() {
                return Err(Error::Geometry(format!(
                    "seam check at ({}, {}) has no adjacent reserve qubits",
                    x, y
                )));
            }
            let targets = vec![
                self.most_recent(ancilla)?,
                self.nth_most_recent(ancilla, 1)?,
                self.most_recent(reserve[k - 1])?,
                self.most_recent(reserve[k])?,
            ];
            self.circuit.detector(targets);
        }
        Ok(())
    }

    pub fn round_detectors_for_surgery(&mut self, surgery: &mut LatticeSurgery) -> Result<()> {
        match surgery.marker() {
            PhaseMarker::FreshlyInitialized => {
                // Seam checks took on brand-new stabilizer identities at
                // the merge; their first outcome compares to nothing.
                let seam: BTreeSet<Qubit> = surgery.seam_ancillas().iter().copied().collect();
                for ancilla in surgery.lattice().active_ancillas() {
                    if seam.contains(&ancilla) {
                        continue;
                    }
                    self.consecutive_round_detector(ancilla)?;
                }
                surgery.set_marker(PhaseMarker::Steady);
            }
            PhaseMarker::Steady => {
                for ancilla in surgery.lattice().active_ancillas() {
                    self.consecutive_round_detector(ancilla)?;
                }
            }
            PhaseMarker::PostSurgeryEdge(_) => {
                return Err(Error::InvariantViolation(
                    "a merged region cannot carry a post-surgery marker".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Final-round detectors for a destructively measured patch: each
    /// check of the measured basis compares its last outcome with its
    /// data qubits' final measurements.
    pub fn final_measurement_detectors(
        &mut self,
        surface: &Surface,
        basis: MeasurementBasis,
    ) -> Result<()> {
        let group = StabilizerGroup::plain(basis);
        for ancilla in surface.lattice().group(group).iter().copied() {
            let mut targets = vec![self.most_recent(ancilla)?];
            for data in surface.lattice().data_neighbors(ancilla)? {
                targets.push(self.most_recent(data)?);
            }
            self.circuit.detector(targets);
        }
        Ok(())
    }

    /// One representative logical operator of the measured basis. When
    /// the operator runs vertically and the patch was prepared in the
    /// measured basis, it is the straight chain of final outcomes along
    /// the rightmost data column. Every other combination routes
    /// through guide checks instead: each guide contributes its
    /// first-ever outcome joined with its data qubits' final outcomes,
    /// so the randomness of the first stabilizer projection cancels out
    /// of the parity. A vertical operator walks the guide column next
    /// to the rightmost data column; a horizontal one walks the guide
    /// row above the bottom data row. The guide lines assume an odd
    /// code distance.
    pub fn surface_observable(
        &mut self,
        surface: &Surface,
        basis: MeasurementBasis,
        observable_index: u32,
    ) -> Result<()> {
        let dist = surface.dist();
        let mut targets = Vec::new();
        if logical_runs_vertically(surface.orientation(), basis) {
            if basis == surface.initial_state().basis() {
                for y in 0..dist {
                    let data = surface.lattice().data_qubits()[(dist - 1, y)];
                    targets.push(self.most_recent(data)?);
                }
            } else {
                // A cross-basis readout leaves the individual data
                // outcomes random, so the straight chain is not usable.
                for y in (0..dist).step_by(2) {
                    self.push_guide_chain(surface, (dist - 1, y), &mut targets)?;
                }
            }
        } else {
            for x in (0..dist).step_by(2) {
                self.push_guide_chain(surface, (x, 1), &mut targets)?;
            }
        }
        self.circuit.observable_include(observable_index, targets);
        Ok(())
    }

    fn push_guide_chain(
        &self,
        surface: &Surface,
        (x, y): (u32, u32),
        targets: &mut Vec<RecOffset>,
    ) -> Result<()> {
        let guide = surface.lattice().ancilla_qubits()[(x, y)];
        let earliest = self.measurements.earliest(guide).ok_or_else(|| {
            Error::InvariantViolation(format!("guide check {} was never measured", guide))
        })?;
        targets.push(earliest);
        for data in surface.lattice().data_neighbors(guide)? {
            targets.push(self.most_recent(data)?);
        }
        Ok(())
    }
}
