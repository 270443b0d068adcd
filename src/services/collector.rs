use log::{error, info};

use crate::formula::FormulaEvaluator;
use crate::storage::models::{Measurement, SensorDefinition};

/// Evaluates every configured sensor once, in definition order.
pub struct MeasurementCollector {
    evaluator: FormulaEvaluator,
}

impl MeasurementCollector {
    pub fn new(evaluator: FormulaEvaluator) -> Self {
        Self { evaluator }
    }

    /// One measurement per sensor that evaluated successfully.
    ///
    /// Sensors are polled strictly one after another. A failing sensor is
    /// logged and left out; it never aborts the rest of the cycle.
    pub async fn collect(&self, definitions: &[SensorDefinition]) -> Vec<Measurement> {
        let mut measurements = Vec::with_capacity(definitions.len());

        for definition in definitions {
            match self
                .evaluator
                .evaluate(
                    &definition.formula,
                    definition.id,
                    definition.signed,
                    definition.register_span,
                )
                .await
            {
                Ok(value) => measurements.push(Measurement::from_definition(definition, value)),
                Err(e) => {
                    error!(
                        "❌ Skipping sensor {} ({}) [{}]: formula '{}' failed: {}",
                        definition.id,
                        definition.category,
                        definition.output_names.join(","),
                        definition.formula,
                        e
                    );
                }
            }
        }

        info!(
            "📊 Collected {}/{} sensor value(s)",
            measurements.len(),
            definitions.len()
        );
        measurements
    }
}
