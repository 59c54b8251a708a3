//! Batch scaling and unit conversion.
//!
//! Scaling is linear: every ingredient's baseline grams is multiplied by
//! `size / Σ baseline grams`, so with a mass target the scaled column
//! sums to exactly the requested size. Unit conversion happens after
//! scaling, on the display value only; the scaled grams column always
//! stays in grams.

use serde::Serialize;

use crate::store::Ingredient;

/// Milliliters per US gallon.
pub const ML_PER_US_GALLON: f64 = 3785.41;
/// Milliliters per US fluid ounce.
pub const ML_PER_US_FLUID_OUNCE: f64 = 29.5735;
/// Grams per pound. Pounds are a pure mass conversion; density never
/// enters into it.
pub const GRAMS_PER_POUND: f64 = 453.592;

/// Target unit for a batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchUnit {
    Grams,
    Gallons,
    FluidOunces,
    Pounds,
}

impl BatchUnit {
    pub fn label(&self) -> &'static str {
        match self {
            BatchUnit::Grams => "g",
            BatchUnit::Gallons => "gal",
            BatchUnit::FluidOunces => "fl oz",
            BatchUnit::Pounds => "lb",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "g" | "grams" | "gram" => Some(BatchUnit::Grams),
            "gal" | "gallon" | "gallons" => Some(BatchUnit::Gallons),
            "floz" | "fl-oz" | "fl_oz" | "oz" | "ounces" => Some(BatchUnit::FluidOunces),
            "lb" | "lbs" | "pound" | "pounds" => Some(BatchUnit::Pounds),
            _ => None,
        }
    }
}

impl std::fmt::Display for BatchUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of a computed batch: the baseline mass, the scaled mass, and
/// the scaled mass converted into the requested unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchLineItem {
    pub code: String,
    pub label: String,
    pub baseline_grams: f64,
    pub scaled_grams: f64,
    pub display_value: f64,
    pub unit: BatchUnit,
}

/// Scales a formula's ingredients to `size` units. Items come back in
/// the same order as the input. An empty input, or a baseline sum ≤ 0,
/// produces no items.
pub fn calculate_batch(ingredients: &[&Ingredient], size: f64, unit: BatchUnit) -> Vec<BatchLineItem> {
    let baseline_sum: f64 = ingredients.iter().map(|i| i.grams).sum();
    if baseline_sum <= 0.0 {
        return Vec::new();
    }

    let factor = size / baseline_sum;
    ingredients
        .iter()
        .map(|i| {
            let scaled_grams = i.grams * factor;
            BatchLineItem {
                code: i.code.clone(),
                label: i.label.clone(),
                baseline_grams: i.grams,
                scaled_grams,
                display_value: convert_from_grams(scaled_grams, i.density, unit),
                unit,
            }
        })
        .collect()
}

/// Converts a mass in grams to the display unit. Volume conversions use
/// the ingredient's density, substituting 1.0 when it is missing (≤ 0).
pub fn convert_from_grams(grams: f64, density: f64, unit: BatchUnit) -> f64 {
    let density = if density <= 0.0 { 1.0 } else { density };
    match unit {
        BatchUnit::Grams => grams,
        BatchUnit::Gallons => grams / (density * ML_PER_US_GALLON),
        BatchUnit::FluidOunces => grams / (density * ML_PER_US_FLUID_OUNCE),
        BatchUnit::Pounds => grams / GRAMS_PER_POUND,
    }
}

/// `(Σ baseline grams, Σ scaled grams, Σ display values)` for the footer
/// row of a displayed or exported table.
pub fn totals(items: &[BatchLineItem]) -> (f64, f64, f64) {
    items.iter().fold((0.0, 0.0, 0.0), |(b, s, d), item| {
        (
            b + item.baseline_grams,
            s + item.scaled_grams,
            d + item.display_value,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(code: &str, density: f64, grams: f64) -> Ingredient {
        Ingredient {
            code: code.to_string(),
            label: format!("{} pigment", code),
            density,
            grams,
            cost: 1.0,
            formula_id: "12".to_string(),
        }
    }

    #[test]
    fn mass_batch_sums_to_requested_size() {
        let a = ingredient("B1", 1.2, 120.0);
        let b = ingredient("B2", 1.05, 30.0);
        let c = ingredient("S9", 0.92, 850.0);
        let rows = calculate_batch(&[&a, &b, &c], 5000.0, BatchUnit::Grams);

        assert_eq!(rows.len(), 3);
        let total: f64 = rows.iter().map(|r| r.scaled_grams).sum();
        assert!((total - 5000.0).abs() < 1e-9);

        // order is preserved and ratios hold
        assert_eq!(rows[0].code, "B1");
        assert!((rows[0].scaled_grams / rows[1].scaled_grams - 4.0).abs() < 1e-9);
    }

    #[test]
    fn zero_baseline_sum_yields_no_items() {
        let a = ingredient("B1", 1.0, 0.0);
        assert!(calculate_batch(&[&a], 1000.0, BatchUnit::Grams).is_empty());
        assert!(calculate_batch(&[], 1000.0, BatchUnit::Grams).is_empty());
    }

    #[test]
    fn gallon_conversion_uses_density() {
        let v = convert_from_grams(3785.41, 1.0, BatchUnit::Gallons);
        assert!((v - 1.0).abs() < 1e-9);

        // denser material occupies less volume
        let v = convert_from_grams(3785.41, 2.0, BatchUnit::Gallons);
        assert!((v - 0.5).abs() < 1e-9);
    }

    #[test]
    fn missing_density_defaults_to_one() {
        let with_default = convert_from_grams(29.5735, 0.0, BatchUnit::FluidOunces);
        assert!((with_default - 1.0).abs() < 1e-9);
        let negative = convert_from_grams(29.5735, -3.0, BatchUnit::FluidOunces);
        assert!((negative - 1.0).abs() < 1e-9);
    }

    #[test]
    fn pounds_ignore_density() {
        let light = convert_from_grams(453.592, 0.5, BatchUnit::Pounds);
        let dense = convert_from_grams(453.592, 2.0, BatchUnit::Pounds);
        assert!((light - 1.0).abs() < 1e-9);
        assert!((dense - 1.0).abs() < 1e-9);
    }

    #[test]
    fn totals_sum_every_column() {
        let a = ingredient("B1", 1.0, 100.0);
        let b = ingredient("B2", 1.0, 300.0);
        let rows = calculate_batch(&[&a, &b], 800.0, BatchUnit::Grams);

        let (baseline, scaled, display) = totals(&rows);
        assert!((baseline - 400.0).abs() < 1e-9);
        assert!((scaled - 800.0).abs() < 1e-9);
        assert!((display - 800.0).abs() < 1e-9);
    }

    #[test]
    fn line_items_serialize_for_json_output() {
        let a = ingredient("B1", 1.0, 100.0);
        let rows = calculate_batch(&[&a], 200.0, BatchUnit::Gallons);
        let json = serde_json::to_string(&rows).unwrap();
        assert!(json.contains("\"code\":\"B1\""));
        assert!(json.contains("\"unit\":\"gallons\""));
    }

    #[test]
    fn unit_parsing_and_labels() {
        assert_eq!(BatchUnit::parse("Gallons"), Some(BatchUnit::Gallons));
        assert_eq!(BatchUnit::parse(" lb "), Some(BatchUnit::Pounds));
        assert_eq!(BatchUnit::parse("floz"), Some(BatchUnit::FluidOunces));
        assert_eq!(BatchUnit::parse("stone"), None);
        assert_eq!(BatchUnit::Gallons.label(), "gal");
    }
}
