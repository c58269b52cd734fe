//! Recipe cost aggregation.
//!
//! A recipe's `custo_estimado` is derived: the sum of `quantity * unit_cost`
//! over its ingredients, with unit costs read from the products at
//! computation time. The aggregator writes the result straight to the store;
//! cached recipe pages are not touched, so callers invalidate them.

use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use serde_json::Value;

use crate::entity::{decimal_from_json, round_cost, Ingredient};
use crate::error::{Error, Result};
use crate::query::Scalar;
use crate::store::RelationalStore;

const INGREDIENTS_SQL: &str = "SELECT i.id AS id, i.receita_id AS receita_id, \
     i.produto_id AS produto_id, p.nome AS nome_produto, p.unidade AS unidade, \
     i.quantidade AS quantidade, p.custo_unitario AS custo_unitario \
     FROM ingredientes_receita i JOIN produtos p ON p.id = i.produto_id \
     WHERE i.receita_id = ? ORDER BY i.id";

/// Recomputes and persists recipe costs.
pub struct CostAggregator<S> {
    store: Arc<S>,
}

impl<S: RelationalStore> CostAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        CostAggregator { store }
    }

    /// Ingredient lines of a recipe with current product costs, in insertion
    /// order.
    pub async fn ingredients(&self, recipe_id: i64) -> Result<Vec<Ingredient>> {
        let rows = self
            .store
            .fetch_all(INGREDIENTS_SQL, &[Scalar::Integer(recipe_id)])
            .await?;
        rows.rows
            .into_iter()
            .map(|row| Ok(serde_json::from_value(Value::Object(row))?))
            .collect()
    }

    /// Persisted cost of a recipe, without recomputing it.
    pub async fn stored_cost(&self, recipe_id: i64) -> Result<BigDecimal> {
        match self
            .store
            .fetch_scalar(
                "SELECT custo_estimado FROM receitas WHERE id = ?",
                &[Scalar::Integer(recipe_id)],
            )
            .await?
        {
            Some(value) => decimal_from_json(&value),
            None => Err(recipe_not_found(recipe_id)),
        }
    }

    /// Sum the recipe's line costs, round to cents and persist the result.
    ///
    /// A recipe without ingredients costs `0.00`.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if the recipe does not exist
    /// - any store error from the read or the update; a failed update leaves
    ///   the previously stored cost in place
    pub async fn recompute_cost(&self, recipe_id: i64) -> Result<BigDecimal> {
        let exists = self
            .store
            .fetch_scalar("SELECT 1 FROM receitas WHERE id = ?", &[Scalar::Integer(recipe_id)])
            .await?;
        if exists.is_none() {
            return Err(recipe_not_found(recipe_id));
        }

        let ingredients = self.ingredients(recipe_id).await?;
        let total = ingredients
            .iter()
            .fold(BigDecimal::zero(), |acc, ingredient| acc + ingredient.line_cost());
        let cost = round_cost(&total);

        let outcome = self
            .store
            .execute(
                "UPDATE receitas SET custo_estimado = ? WHERE id = ?",
                &[Scalar::Text(cost.to_string()), Scalar::Integer(recipe_id)],
            )
            .await
            .map_err(|e| {
                warn!("✗ cost update for recipe {} failed: {}", recipe_id, e);
                e
            })?;
        if outcome.affected_rows == 0 {
            return Err(recipe_not_found(recipe_id));
        }

        info!(
            "✓ recipe {} cost recomputed: {} ({} ingredients)",
            recipe_id,
            cost,
            ingredients.len()
        );
        Ok(cost)
    }

    /// Recompute every recipe that uses `product_id`. Returns the new cost
    /// per recipe id.
    pub async fn recompute_for_product(&self, product_id: i64) -> Result<Vec<(i64, BigDecimal)>> {
        let rows = self
            .store
            .fetch_all(
                "SELECT DISTINCT receita_id FROM ingredientes_receita WHERE produto_id = ? ORDER BY receita_id",
                &[Scalar::Integer(product_id)],
            )
            .await?;

        let mut costs = Vec::with_capacity(rows.len());
        for row in &rows.rows {
            let recipe_id = row
                .get("receita_id")
                .and_then(Value::as_i64)
                .ok_or_else(|| Error::SerializationError("receita_id is not an integer".into()))?;
            costs.push((recipe_id, self.recompute_cost(recipe_id).await?));
        }
        debug!("product {} affects {} recipes", product_id, costs.len());
        Ok(costs)
    }
}

fn recipe_not_found(recipe_id: i64) -> Error {
    Error::NotFound(format!("recipe {} does not exist", recipe_id))
}
