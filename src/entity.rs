//! Entity value objects and the trait that makes an entity pageable.
//!
//! Field names are English in Rust and Portuguese on the wire and in the
//! database (`nome`, `custo_unitario`, ...). Decimal fields travel as strings
//! so no precision is lost in JSON.

use std::str::FromStr;

use bigdecimal::{BigDecimal, RoundingMode, Zero};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::columns::{ColumnAllowList, TextMatch};
use crate::error::{Error, Result};

/// Scale of persisted costs.
pub const COST_SCALE: i64 = 2;

/// Trait implemented by every entity listed through a paged repository.
///
/// # Example
///
/// ```
/// use recipe_ledger::entity::{PagedEntity, Product};
///
/// assert_eq!(Product::entity_name(), "produtos");
/// assert!(Product::columns().is_sortable("nome"));
/// ```
pub trait PagedEntity: Send + Sync + Serialize + DeserializeOwned + Clone {
    /// Cache namespace and log label.
    fn entity_name() -> &'static str;

    /// Table queried by the repository. Must be a plain identifier.
    fn table() -> &'static str;

    /// Declared sortable/filterable/searchable columns.
    fn columns() -> &'static ColumnAllowList;

    /// Projection used for page queries.
    fn select_list() -> &'static str {
        "*"
    }

    /// Optional: validate a row after decoding.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Parse a decimal from a JSON value produced by the store.
///
/// Accepts numeric strings (how decimal columns are stored) and plain numbers
/// (literals written by hand or computed in SQL).
pub fn decimal_from_json(value: &Value) -> Result<BigDecimal> {
    match value {
        Value::Number(n) => Ok(BigDecimal::from_str(&n.to_string())?),
        Value::String(s) => Ok(BigDecimal::from_str(s.trim())?),
        other => Err(Error::SerializationError(format!(
            "expected a decimal, got {}",
            other
        ))),
    }
}

/// Round half-up to [`COST_SCALE`] places.
pub fn round_cost(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(COST_SCALE, RoundingMode::HalfUp)
}

/// Serde adapter for `BigDecimal` fields: string out, string or number in.
pub mod decimal {
    use bigdecimal::BigDecimal;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigDecimal, D::Error> {
        let value = Value::deserialize(deserializer)?;
        super::decimal_from_json(&value).map_err(D::Error::custom)
    }
}

fn require_name(name: &str, what: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::ValidationError(format!("{} name must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

fn require_non_negative(value: &BigDecimal, field: &str) -> Result<()> {
    if value < &BigDecimal::zero() {
        return Err(Error::ValidationError(format!(
            "{} must not be negative, got {}",
            field, value
        )));
    }
    Ok(())
}

// ============================================================================
// Products
// ============================================================================

static PRODUCT_COLUMNS: Lazy<ColumnAllowList> = Lazy::new(|| {
    ColumnAllowList::new("id")
        .column("id", "id")
        .text_column("nome", "nome", TextMatch::Contains)
        .column("categoria_id", "categoria_id")
        .filter_only("unidade", "unidade")
        .column("custo_unitario", "CAST(custo_unitario AS REAL)")
        .column("estoque", "CAST(estoque AS REAL)")
        .searchable("nome")
        .default_sort("nome")
});

/// Stocked product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "categoria_id")]
    pub category_id: Option<i64>,
    #[serde(rename = "unidade")]
    pub unit: String,
    #[serde(rename = "custo_unitario", with = "decimal")]
    pub unit_cost: BigDecimal,
    #[serde(rename = "estoque", with = "decimal")]
    pub stock: BigDecimal,
}

impl PagedEntity for Product {
    fn entity_name() -> &'static str {
        "produtos"
    }

    fn table() -> &'static str {
        "produtos"
    }

    fn columns() -> &'static ColumnAllowList {
        &PRODUCT_COLUMNS
    }

    fn select_list() -> &'static str {
        "id, nome, categoria_id, unidade, custo_unitario, estoque"
    }
}

/// Fields for creating or replacing a product.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "categoria_id", default)]
    pub category_id: Option<i64>,
    #[serde(rename = "unidade")]
    pub unit: String,
    #[serde(rename = "custo_unitario", with = "decimal")]
    pub unit_cost: BigDecimal,
    #[serde(rename = "estoque", with = "decimal")]
    pub stock: BigDecimal,
}

impl NewProduct {
    /// Product sold by the unit (`un`) with no stock.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` for a blank name or a negative cost.
    pub fn new(name: &str, unit_cost: BigDecimal) -> Result<Self> {
        let product = NewProduct {
            name: require_name(name, "product")?,
            category_id: None,
            unit: "un".to_string(),
            unit_cost,
            stock: BigDecimal::zero(),
        };
        product.validate()?;
        Ok(product)
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_stock(mut self, stock: BigDecimal) -> Self {
        self.stock = stock;
        self
    }

    /// Re-check every field; builders and deserialization bypass `new`.
    pub fn validate(&self) -> Result<()> {
        require_name(&self.name, "product")?;
        if self.unit.trim().is_empty() {
            return Err(Error::ValidationError("product unit must not be empty".into()));
        }
        require_non_negative(&self.unit_cost, "custo_unitario")?;
        require_non_negative(&self.stock, "estoque")
    }
}

// ============================================================================
// Recipes
// ============================================================================

static RECIPE_COLUMNS: Lazy<ColumnAllowList> = Lazy::new(|| {
    ColumnAllowList::new("id")
        .column("id", "id")
        .text_column("nome", "nome", TextMatch::Contains)
        .column("categoria_id", "categoria_id")
        .column("rendimento", "rendimento")
        .column("custo_estimado", "CAST(custo_estimado AS REAL)")
        .text_column("modo_preparo", "modo_preparo", TextMatch::Contains)
        .searchable("nome")
        .searchable("modo_preparo")
        .default_sort("nome")
});

/// Recipe with its persisted estimated cost.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "categoria_id")]
    pub category_id: Option<i64>,
    /// Portions produced.
    #[serde(rename = "rendimento")]
    pub yield_count: i64,
    #[serde(rename = "modo_preparo", default)]
    pub instructions: Option<String>,
    /// Sum of ingredient line costs; derived, see `CostAggregator`.
    #[serde(rename = "custo_estimado", with = "decimal")]
    pub estimated_cost: BigDecimal,
}

impl Recipe {
    /// Estimated cost divided by the yield, rounded to cents.
    pub fn cost_per_portion(&self) -> BigDecimal {
        if self.yield_count <= 0 {
            return round_cost(&self.estimated_cost);
        }
        round_cost(&(&self.estimated_cost / BigDecimal::from(self.yield_count)))
    }
}

impl PagedEntity for Recipe {
    fn entity_name() -> &'static str {
        "receitas"
    }

    fn table() -> &'static str {
        "receitas"
    }

    fn columns() -> &'static ColumnAllowList {
        &RECIPE_COLUMNS
    }

    fn select_list() -> &'static str {
        "id, nome, categoria_id, rendimento, modo_preparo, custo_estimado"
    }
}

/// Fields for creating or replacing a recipe. The cost is never supplied by
/// the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewRecipe {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "categoria_id", default)]
    pub category_id: Option<i64>,
    #[serde(rename = "rendimento")]
    pub yield_count: i64,
    #[serde(rename = "modo_preparo", default)]
    pub instructions: Option<String>,
}

impl NewRecipe {
    /// Recipe yielding one portion.
    ///
    /// # Errors
    ///
    /// `Error::ValidationError` for a blank name.
    pub fn new(name: &str) -> Result<Self> {
        Ok(NewRecipe {
            name: require_name(name, "recipe")?,
            category_id: None,
            yield_count: 1,
            instructions: None,
        })
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_yield(mut self, yield_count: i64) -> Self {
        self.yield_count = yield_count;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        require_name(&self.name, "recipe")?;
        if self.yield_count < 1 {
            return Err(Error::ValidationError(format!(
                "rendimento must be at least 1, got {}",
                self.yield_count
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Ingredients
// ============================================================================

/// Ingredient line joined with the product's current cost.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    #[serde(rename = "receita_id")]
    pub recipe_id: i64,
    #[serde(rename = "produto_id")]
    pub product_id: i64,
    #[serde(rename = "nome_produto")]
    pub product_name: String,
    #[serde(rename = "unidade")]
    pub unit: String,
    #[serde(rename = "quantidade", with = "decimal")]
    pub quantity: BigDecimal,
    /// Read from the product when the line is loaded, never stored here.
    #[serde(rename = "custo_unitario", with = "decimal")]
    pub unit_cost: BigDecimal,
}

impl Ingredient {
    /// `quantity * unit_cost`, unrounded.
    pub fn line_cost(&self) -> BigDecimal {
        &self.quantity * &self.unit_cost
    }
}

/// Ingredient line to add to a recipe.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewIngredient {
    #[serde(rename = "produto_id")]
    pub product_id: i64,
    #[serde(rename = "quantidade", with = "decimal")]
    pub quantity: BigDecimal,
}

impl NewIngredient {
    /// # Errors
    ///
    /// `Error::ValidationError` unless `quantity > 0`.
    pub fn new(product_id: i64, quantity: BigDecimal) -> Result<Self> {
        let ingredient = NewIngredient {
            product_id,
            quantity,
        };
        ingredient.validate()?;
        Ok(ingredient)
    }

    pub fn validate(&self) -> Result<()> {
        validate_quantity(&self.quantity)
    }
}

/// Ingredient quantities are strictly positive.
pub fn validate_quantity(quantity: &BigDecimal) -> Result<()> {
    if quantity <= &BigDecimal::zero() {
        return Err(Error::ValidationError(format!(
            "quantidade must be positive, got {}",
            quantity
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_product_from_store_record() {
        let product: Product = serde_json::from_value(json!({
            "id": 1,
            "nome": "Farinha",
            "categoria_id": null,
            "unidade": "kg",
            "custo_unitario": 3.5,
            "estoque": 10
        }))
        .unwrap();

        assert_eq!(product.unit_cost, dec("3.50"));
        assert_eq!(product.stock, dec("10"));
        assert_eq!(product.category_id, None);

        let out = serde_json::to_value(&product).unwrap();
        assert_eq!(out["custo_unitario"], json!("3.5"));
        assert_eq!(out["nome"], json!("Farinha"));
    }

    #[test]
    fn test_decimal_from_json() {
        assert_eq!(decimal_from_json(&json!("17.00")).unwrap(), dec("17"));
        assert_eq!(decimal_from_json(&json!(0.1)).unwrap(), dec("0.1"));
        assert!(decimal_from_json(&json!(null)).is_err());
        assert!(decimal_from_json(&json!("abc")).is_err());
    }

    #[test]
    fn test_round_cost_half_up() {
        assert_eq!(round_cost(&dec("2.345")).to_string(), "2.35");
        assert_eq!(round_cost(&dec("17")).to_string(), "17.00");
        assert_eq!(round_cost(&dec("0")).to_string(), "0.00");
    }

    #[test]
    fn test_new_product_validation() {
        assert!(NewProduct::new("  ", dec("1")).is_err());
        assert!(NewProduct::new("Ovo", dec("-0.01")).is_err());

        let product = NewProduct::new(" Ovo ", dec("0.80")).unwrap();
        assert_eq!(product.name, "Ovo");
        assert_eq!(product.unit, "un");
        assert!(product.clone().with_unit("").validate().is_err());
        assert!(product.with_stock(dec("-1")).validate().is_err());
    }

    #[test]
    fn test_new_recipe_validation() {
        assert!(NewRecipe::new("").is_err());
        let recipe = NewRecipe::new("Bolo").unwrap().with_yield(0);
        assert!(matches!(recipe.validate(), Err(Error::ValidationError(_))));
        assert!(NewRecipe::new("Bolo").unwrap().with_yield(8).validate().is_ok());
    }

    #[test]
    fn test_ingredient_line_cost() {
        let ingredient = Ingredient {
            id: 1,
            recipe_id: 1,
            product_id: 1,
            product_name: "Farinha".into(),
            unit: "kg".into(),
            quantity: dec("2"),
            unit_cost: dec("3.50"),
        };
        assert_eq!(ingredient.line_cost(), dec("7.00"));
        assert!(NewIngredient::new(1, dec("0")).is_err());
        assert!(NewIngredient::new(1, dec("0.25")).is_ok());
    }

    #[test]
    fn test_cost_per_portion() {
        let recipe = Recipe {
            id: 1,
            name: "Bolo".into(),
            category_id: Some(2),
            yield_count: 3,
            instructions: None,
            estimated_cost: dec("10.00"),
        };
        assert_eq!(recipe.cost_per_portion().to_string(), "3.33");
    }

    #[test]
    fn test_entity_allow_lists() {
        assert!(Product::columns().is_filterable("unidade"));
        assert!(!Product::columns().is_sortable("unidade"));
        assert_eq!(Recipe::columns().searchable_exprs(), vec!["nome", "modo_preparo"]);
        assert!(!Recipe::columns().is_allowed("custo_estimado; --"));
    }
}
