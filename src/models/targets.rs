use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Stored per-client macro targets. Tolerances are a JSONB blob that may be
/// partial or absent; [`ClientTargets::resolve`] fills in the defaults.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClientTargetsRow {
    pub client_id: Uuid,
    pub kcal_target: Option<i32>,
    pub protein_target_g: Option<i32>,
    pub fat_target_g: Option<i32>,
    pub carbs_target_g: Option<i32>,
    pub tolerances: Option<serde_json::Value>,
}

/// Resolved targets with tolerance corridor, ready for compliance checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientTargets {
    pub kcal_target: f64,
    pub protein_target_g: f64,
    pub fat_target_g: f64,
    pub carbs_target_g: f64,
    pub tolerances: MacroTolerances,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroTolerances {
    #[serde(default = "default_kcal_pct")]
    pub kcal_pct: f64,
    #[serde(default = "default_macro_pct")]
    pub protein_pct: f64,
    #[serde(default = "default_macro_pct")]
    pub fat_pct: f64,
    #[serde(default = "default_macro_pct")]
    pub carbs_pct: f64,
    #[serde(default)]
    pub min_g: MacroFloors,
}

/// Absolute gram floors so tight targets keep a workable corridor. kcal has
/// no floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroFloors {
    #[serde(rename = "p", default = "default_protein_floor")]
    pub protein: f64,
    #[serde(rename = "f", default = "default_fat_floor")]
    pub fat: f64,
    #[serde(rename = "c", default = "default_carbs_floor")]
    pub carbs: f64,
}

fn default_kcal_pct() -> f64 {
    0.10
}

fn default_macro_pct() -> f64 {
    0.20
}

fn default_protein_floor() -> f64 {
    10.0
}

fn default_fat_floor() -> f64 {
    10.0
}

fn default_carbs_floor() -> f64 {
    15.0
}

impl Default for MacroTolerances {
    fn default() -> Self {
        Self {
            kcal_pct: default_kcal_pct(),
            protein_pct: default_macro_pct(),
            fat_pct: default_macro_pct(),
            carbs_pct: default_macro_pct(),
            min_g: MacroFloors::default(),
        }
    }
}

impl Default for MacroFloors {
    fn default() -> Self {
        Self {
            protein: default_protein_floor(),
            fat: default_fat_floor(),
            carbs: default_carbs_floor(),
        }
    }
}

impl Default for ClientTargets {
    fn default() -> Self {
        Self {
            kcal_target: 2000.0,
            protein_target_g: 100.0,
            fat_target_g: 70.0,
            carbs_target_g: 250.0,
            tolerances: MacroTolerances::default(),
        }
    }
}

impl ClientTargets {
    /// Resolve a stored row into usable targets. A missing row falls back to
    /// the defaults wholesale; a present row is taken as-is (a NULL target
    /// stays zero and fails compliance closed), with malformed tolerance
    /// JSON degrading to the default corridor.
    pub fn resolve(row: Option<ClientTargetsRow>) -> Self {
        let Some(row) = row else {
            return Self::default();
        };

        let tolerances = row
            .tolerances
            .and_then(|value| serde_json::from_value::<MacroTolerances>(value).ok())
            .unwrap_or_default();

        Self {
            kcal_target: row.kcal_target.map(f64::from).unwrap_or(0.0),
            protein_target_g: row.protein_target_g.map(f64::from).unwrap_or(0.0),
            fat_target_g: row.fat_target_g.map(f64::from).unwrap_or(0.0),
            carbs_target_g: row.carbs_target_g.map(f64::from).unwrap_or(0.0),
            tolerances,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_row_resolves_to_defaults() {
        let targets = ClientTargets::resolve(None);
        assert_eq!(targets, ClientTargets::default());
        assert_eq!(targets.kcal_target, 2000.0);
        assert_eq!(targets.tolerances.min_g.carbs, 15.0);
    }

    #[test]
    fn partial_tolerances_merge_with_defaults() {
        let row = ClientTargetsRow {
            client_id: Uuid::new_v4(),
            kcal_target: Some(1800),
            protein_target_g: Some(120),
            fat_target_g: Some(60),
            carbs_target_g: Some(200),
            tolerances: Some(json!({"kcal_pct": 0.05, "min_g": {"p": 12}})),
        };

        let targets = ClientTargets::resolve(Some(row));
        assert_eq!(targets.tolerances.kcal_pct, 0.05);
        assert_eq!(targets.tolerances.protein_pct, 0.20);
        assert_eq!(targets.tolerances.min_g.protein, 12.0);
        assert_eq!(targets.tolerances.min_g.fat, 10.0);
    }

    #[test]
    fn malformed_tolerances_degrade_to_defaults() {
        let row = ClientTargetsRow {
            client_id: Uuid::new_v4(),
            kcal_target: Some(2000),
            protein_target_g: None,
            fat_target_g: Some(70),
            carbs_target_g: Some(250),
            tolerances: Some(json!("not an object")),
        };

        let targets = ClientTargets::resolve(Some(row));
        assert_eq!(targets.tolerances, MacroTolerances::default());
        // NULL target stays zero; compliance fails closed on it.
        assert_eq!(targets.protein_target_g, 0.0);
    }
}
