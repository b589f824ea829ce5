use crate::error::Result;
use crate::experiment::{Experiment, PatchCoord};
use crate::noise::ErrorModel;
use crate::surface::{InitialState, MeasurementBasis};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchPlan {
    pub coord: PatchCoord,
    pub initial_state: InitialState,
    pub flip_orientation: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlanStep {
    Rounds(u32),
    Merge(PatchCoord, PatchCoord),
    Split(PatchCoord, PatchCoord),
    Measure(PatchCoord, MeasurementBasis),
}

/// An experiment description loaded from a JSON file.
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentPlan {
    pub distance: u32,
    pub patches: Vec<PatchPlan>,
    pub steps: Vec<PlanStep>,
}

fn parse_u32(value: &serde_json::Value, name: &str) -> std::result::Result<u32, String> {
    if let Some(n) = value.as_i64() {
        if n <= 0 {
            Err(format!("{} should be positive, but got {}", name, n))
        } else if n > u32::MAX as i64 {
            Err(format!("{} is too large", name))
        } else {
            Ok(n as u32)
        }
    } else {
        Err(format!("{} should be an integer, but got {}", name, value))
    }
}

fn parse_coord(value: &serde_json::Value, name: &str) -> std::result::Result<PatchCoord, String> {
    let pair = value
        .as_array()
        .ok_or(format!("{} should be a [x, y] pair, but got {}", name, value))?;
    if pair.len() != 2 {
        return Err(format!("{} should be a [x, y] pair, but got {}", name, value));
    }
    let mut xy = [0_u32; 2];
    for (i, entry) in pair.iter().enumerate() {
        xy[i] = match entry.as_i64() {
            Some(n) if (0..=u32::MAX as i64).contains(&n) => n as u32,
            _ => {
                return Err(format!(
                    "{} should hold non-negative integers, but got {}",
                    name, entry
                ))
            }
        };
    }
    Ok(PatchCoord::new(xy[0], xy[1]))
}

fn parse_initial_state(value: &serde_json::Value) -> std::result::Result<InitialState, String> {
    let name = value
        .as_str()
        .ok_or(format!("initial_state should be a string, but got {}", value))?;
    match name {
        "Z_PLUS" => Ok(InitialState::ZPlus),
        "Z_MINUS" => Ok(InitialState::ZMinus),
        "X_PLUS" => Ok(InitialState::XPlus),
        "X_MINUS" => Ok(InitialState::XMinus),
        _ => Err(format!("unknown initial_state: {}", name)),
    }
}

fn parse_basis(value: &serde_json::Value) -> std::result::Result<MeasurementBasis, String> {
    let name = value
        .as_str()
        .ok_or(format!("basis should be a string, but got {}", value))?;
    match name {
        "Z" => Ok(MeasurementBasis::Z),
        "X" => Ok(MeasurementBasis::X),
        _ => Err(format!("unknown basis: {}", name)),
    }
}

impl ExperimentPlan {
    pub fn new_from_json(json: &str) -> std::result::Result<ExperimentPlan, String> {
        let json: serde_json::Value = match serde_json::from_str(json) {
            Ok(json) => json,
            Err(e) => {
                return Err(format!("failed to parse json: {}", e));
            }
        };

        let distance = parse_u32(json.get("distance").ok_or("distance is not found")?, "distance")?;

        let patch_list = json.get("patches").ok_or("patches is not found")?;
        let patch_list = patch_list
            .as_array()
            .ok_or(format!("patches should be a list, but got {}", patch_list))?;
        let mut patches = Vec::new();
        for entry in patch_list {
            if !entry.is_object() {
                return Err(format!("each patch should be an object, but got {}", entry));
            }
            let x = entry.get("x").ok_or(format!("x is not found in patch {}", entry))?;
            let x = match x.as_i64() {
                Some(x) if (0..=u32::MAX as i64).contains(&x) => x as u32,
                _ => return Err(format!("x should be a non-negative integer, but got {}", x)),
            };
            let y = entry.get("y").ok_or(format!("y is not found in patch {}", entry))?;
            let y = match y.as_i64() {
                Some(y) if (0..=u32::MAX as i64).contains(&y) => y as u32,
                _ => return Err(format!("y should be a non-negative integer, but got {}", y)),
            };
            let coord = PatchCoord::new(x, y);
            if patches.iter().any(|p: &PatchPlan| p.coord == coord) {
                return Err(format!("patch ({}, {}) is listed twice", x, y));
            }
            let initial_state = parse_initial_state(
                entry
                    .get("initial_state")
                    .ok_or(format!("initial_state is not found in patch {}", entry))?,
            )?;
            let flip_orientation = match entry.get("flip_orientation") {
                None => false,
                Some(v) => v
                    .as_bool()
                    .ok_or(format!("flip_orientation should be a boolean, but got {}", v))?,
            };
            patches.push(PatchPlan { coord, initial_state, flip_orientation });
        }
        if patches.is_empty() {
            return Err("patches should not be empty".to_string());
        }

        let step_list = json.get("steps").ok_or("steps is not found")?;
        let step_list = step_list
            .as_array()
            .ok_or(format!("steps should be a list, but got {}", step_list))?;
        let mut steps = Vec::new();
        for entry in step_list {
            if !entry.is_object() {
                return Err(format!("each step should be an object, but got {}", entry));
            }
            let action = entry
                .get("action")
                .ok_or(format!("action is not found in step {}", entry))?;
            let action = action
                .as_str()
                .ok_or(format!("action should be a string, but got {}", action))?;
            let step = match action {
                "rounds" => {
                    let count =
                        entry.get("count").ok_or(format!("count is not found in step {}", entry))?;
                    PlanStep::Rounds(parse_u32(count, "count")?)
                }
                "merge" | "split" => {
                    let first = parse_coord(
                        entry.get("first").ok_or(format!("first is not found in step {}", entry))?,
                        "first",
                    )?;
                    let second = parse_coord(
                        entry
                            .get("second")
                            .ok_or(format!("second is not found in step {}", entry))?,
                        "second",
                    )?;
                    if action == "merge" {
                        PlanStep::Merge(first, second)
                    } else {
                        PlanStep::Split(first, second)
                    }
                }
                "measure" => {
                    let patch = parse_coord(
                        entry.get("patch").ok_or(format!("patch is not found in step {}", entry))?,
                        "patch",
                    )?;
                    let basis = parse_basis(
                        entry.get("basis").ok_or(format!("basis is not found in step {}", entry))?,
                    )?;
                    PlanStep::Measure(patch, basis)
                }
                _ => {
                    return Err(format!("unknown action: {}", action));
                }
            };
            steps.push(step);
        }

        Ok(ExperimentPlan { distance, patches, steps })
    }

    /// Builds the experiment this plan describes and drives it to the
    /// end, returning the finished experiment with its circuit.
    pub fn execute(&self, error_model: ErrorModel) -> Result<Experiment> {
        let patches: Vec<(PatchCoord, u32)> =
            self.patches.iter().map(|p| (p.coord, self.distance)).collect();
        let mut experiment = Experiment::new(&patches, error_model)?;
        for patch in &self.patches {
            if patch.flip_orientation {
                experiment.flip_orientation(patch.coord)?;
            }
        }
        for patch in &self.patches {
            experiment.initialize_surface(patch.coord, patch.initial_state)?;
        }
        for step in &self.steps {
            match step {
                PlanStep::Rounds(count) => {
                    for _ in 0..*count {
                        experiment.stabilizer_round()?;
                    }
                }
                PlanStep::Merge(first, second) => experiment.initialize_surgery(*first, *second)?,
                PlanStep::Split(first, second) => experiment.measure_surgery(*first, *second)?,
                PlanStep::Measure(coord, basis) => experiment.measure_surface(*coord, *basis)?,
            }
        }
        Ok(experiment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE_PLAN: &str = r#"{
        "distance": 3,
        "patches": [
            {"x": 0, "y": 0, "initial_state": "Z_PLUS", "flip_orientation": true},
            {"x": 1, "y": 0, "initial_state": "Z_PLUS", "flip_orientation": true}
        ],
        "steps": [
            {"action": "rounds", "count": 2},
            {"action": "merge", "first": [0, 0], "second": [1, 0]},
            {"action": "rounds", "count": 2},
            {"action": "split", "first": [0, 0], "second": [1, 0]},
            {"action": "rounds", "count": 2},
            {"action": "measure", "patch": [0, 0], "basis": "Z"},
            {"action": "measure", "patch": [1, 0], "basis": "Z"}
        ]
    }"#;

    #[test]
    fn test_new_from_json_invalid_syntax() {
        let result = ExperimentPlan::new_from_json("{distance: 3}");
        assert!(matches!(result, Err(s) if s.starts_with("failed to parse json:")));
    }

    #[test]
    fn test_new_from_json_distance_is_missing() {
        let json = r#"{"patches": [], "steps": []}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"distance is not found"));
    }

    #[test]
    fn test_new_from_json_distance_is_not_a_number() {
        let json = r#"{"distance": "3", "patches": [], "steps": []}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"distance should be an integer, but got \"3\""));
    }

    #[test]
    fn test_new_from_json_distance_is_not_positive() {
        let json = r#"{"distance": 0, "patches": [], "steps": []}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"distance should be positive, but got 0"));
    }

    #[test]
    fn test_new_from_json_patches_is_missing() {
        let json = r#"{"distance": 3, "steps": []}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"patches is not found"));
    }

    #[test]
    fn test_new_from_json_patches_is_not_a_list() {
        let json = r#"{"distance": 3, "patches": {}, "steps": []}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"patches should be a list, but got {}"));
    }

    #[test]
    fn test_new_from_json_patches_is_empty() {
        let json = r#"{"distance": 3, "patches": [], "steps": []}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"patches should not be empty"));
    }

    #[test]
    fn test_new_from_json_patch_x_is_missing() {
        let json = r#"{"distance": 3, "patches": [
            {"y": 0, "initial_state": "Z_PLUS"}
        ], "steps": []}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s)
            if s == *r#"x is not found in patch {"initial_state":"Z_PLUS","y":0}"#));
    }

    #[test]
    fn test_new_from_json_patch_x_is_negative() {
        let json = r#"{"distance": 3, "patches": [
            {"x": -1, "y": 0, "initial_state": "Z_PLUS"}
        ], "steps": []}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s)
            if s == *"x should be a non-negative integer, but got -1"));
    }

    #[test]
    fn test_new_from_json_patch_is_listed_twice() {
        let json = r#"{"distance": 3, "patches": [
            {"x": 0, "y": 0, "initial_state": "Z_PLUS"},
            {"x": 0, "y": 0, "initial_state": "X_PLUS"}
        ], "steps": []}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"patch (0, 0) is listed twice"));
    }

    #[test]
    fn test_new_from_json_unknown_initial_state() {
        let json = r#"{"distance": 3, "patches": [
            {"x": 0, "y": 0, "initial_state": "Y_PLUS"}
        ], "steps": []}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"unknown initial_state: Y_PLUS"));
    }

    #[test]
    fn test_new_from_json_flip_orientation_is_not_a_boolean() {
        let json = r#"{"distance": 3, "patches": [
            {"x": 0, "y": 0, "initial_state": "Z_PLUS", "flip_orientation": 1}
        ], "steps": []}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s)
            if s == *"flip_orientation should be a boolean, but got 1"));
    }

    #[test]
    fn test_new_from_json_steps_is_missing() {
        let json = r#"{"distance": 3, "patches": [
            {"x": 0, "y": 0, "initial_state": "Z_PLUS"}
        ]}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"steps is not found"));
    }

    #[test]
    fn test_new_from_json_step_action_is_missing() {
        let json = r#"{"distance": 3, "patches": [
            {"x": 0, "y": 0, "initial_state": "Z_PLUS"}
        ], "steps": [{"count": 2}]}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *r#"action is not found in step {"count":2}"#));
    }

    #[test]
    fn test_new_from_json_unknown_action() {
        let json = r#"{"distance": 3, "patches": [
            {"x": 0, "y": 0, "initial_state": "Z_PLUS"}
        ], "steps": [{"action": "teleport"}]}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"unknown action: teleport"));
    }

    #[test]
    fn test_new_from_json_merge_coordinate_is_malformed() {
        let json = r#"{"distance": 3, "patches": [
            {"x": 0, "y": 0, "initial_state": "Z_PLUS"}
        ], "steps": [{"action": "merge", "first": [0], "second": [1, 0]}]}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"first should be a [x, y] pair, but got [0]"));
    }

    #[test]
    fn test_new_from_json_measure_basis_is_unknown() {
        let json = r#"{"distance": 3, "patches": [
            {"x": 0, "y": 0, "initial_state": "Z_PLUS"}
        ], "steps": [{"action": "measure", "patch": [0, 0], "basis": "Y"}]}"#;
        let result = ExperimentPlan::new_from_json(json);
        assert!(matches!(result, Err(s) if s == *"unknown basis: Y"));
    }

    #[test]
    fn test_new_from_json_reference_plan() {
        let plan = ExperimentPlan::new_from_json(REFERENCE_PLAN).unwrap();
        assert_eq!(plan.distance, 3);
        assert_eq!(plan.patches.len(), 2);
        assert_eq!(
            plan.patches[0],
            PatchPlan {
                coord: PatchCoord::new(0, 0),
                initial_state: InitialState::ZPlus,
                flip_orientation: true,
            }
        );
        assert_eq!(plan.steps.len(), 7);
        assert_eq!(plan.steps[0], PlanStep::Rounds(2));
        assert_eq!(
            plan.steps[1],
            PlanStep::Merge(PatchCoord::new(0, 0), PatchCoord::new(1, 0))
        );
        assert_eq!(
            plan.steps[6],
            PlanStep::Measure(PatchCoord::new(1, 0), MeasurementBasis::Z)
        );
    }

    #[test]
    fn test_execute_reference_plan() {
        let plan = ExperimentPlan::new_from_json(REFERENCE_PLAN).unwrap();
        let experiment = plan.execute(ErrorModel::None).unwrap();
        assert_eq!(experiment.observable_count(), 3);
        assert_eq!(experiment.circuit().num_observables(), 3);
        assert!(experiment.circuit().num_detectors() > 0);
    }

    #[test]
    fn test_execute_rejects_merge_of_unknown_patch() {
        let json = r#"{"distance": 3, "patches": [
            {"x": 0, "y": 0, "initial_state": "Z_PLUS"}
        ], "steps": [
            {"action": "rounds", "count": 1},
            {"action": "merge", "first": [0, 0], "second": [1, 0]}
        ]}"#;
        let plan = ExperimentPlan::new_from_json(json).unwrap();
        let result = plan.execute(ErrorModel::None);
        assert!(result.is_err());
    }
}
