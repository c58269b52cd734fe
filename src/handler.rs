//! Boundary facade used by the presentation layer.
//!
//! Every public operation returns a [`ResultEnvelope`]; errors never cross
//! this boundary as `Err`. Mutations invalidate the cached pages they affect
//! before returning, and keep recipe costs current:
//!
//! | Mutation | Pages invalidated | Costs recomputed |
//! |----------|-------------------|------------------|
//! | create/update/delete product | produtos (+ receitas on update) | every recipe using the product (update) |
//! | create recipe | receitas | the new recipe |
//! | update/delete recipe | receitas | none |
//! | add/update/remove ingredient | receitas | the owning recipe |

use std::sync::Arc;

use bigdecimal::BigDecimal;
use serde_json::Value;

use crate::cache::PageCache;
use crate::config::{DataLayerConfig, PagingConfig};
use crate::cost::CostAggregator;
use crate::entity::{validate_quantity, Ingredient, NewIngredient, NewProduct, NewRecipe, PagedEntity, Product, Recipe};
use crate::envelope::ResultEnvelope;
use crate::error::{Error, Result};
use crate::key::CacheKeyBuilder;
use crate::page::PageResult;
use crate::query::{Filters, PageRequest, Scalar};
use crate::repository::PagedRepository;
use crate::schema::ensure_schema;
use crate::store::{RelationalStore, SqliteStore};
use crate::strategy::CacheStrategy;

/// Data-access entry point for products, recipes and their ingredients.
///
/// All repositories of one handler share a single [`PageCache`].
pub struct DataHandler<S> {
    store: Arc<S>,
    cache: Arc<PageCache>,
    products: PagedRepository<Product, S>,
    recipes: PagedRepository<Recipe, S>,
    costs: CostAggregator<S>,
}

impl DataHandler<SqliteStore> {
    /// Open the configured SQLite database and create any missing table.
    ///
    /// # Errors
    ///
    /// `Error::StoreUnavailable` if the database cannot be opened, or the
    /// first failing schema statement.
    pub async fn open(config: &DataLayerConfig) -> Result<Self> {
        let store = SqliteStore::open(&config.store)?;
        ensure_schema(&store).await?;
        Ok(DataHandler::new(Arc::new(store), config))
    }
}

impl<S: RelationalStore> DataHandler<S> {
    pub fn new(store: Arc<S>, config: &DataLayerConfig) -> Self {
        let cache = Arc::new(PageCache::new(&config.cache));
        DataHandler::with_cache(store, cache, config.paging.clone())
    }

    /// Build a handler around an existing cache (for custom metrics).
    pub fn with_cache(store: Arc<S>, cache: Arc<PageCache>, paging: PagingConfig) -> Self {
        DataHandler {
            products: PagedRepository::new(store.clone(), cache.clone(), paging.clone()),
            recipes: PagedRepository::new(store.clone(), cache.clone(), paging),
            costs: CostAggregator::new(store.clone()),
            store,
            cache,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn products(&self) -> &PagedRepository<Product, S> {
        &self.products
    }

    pub fn recipes(&self) -> &PagedRepository<Recipe, S> {
        &self.recipes
    }

    pub fn costs(&self) -> &CostAggregator<S> {
        &self.costs
    }

    // ------------------------------------------------------------------
    // Listing and invalidation
    // ------------------------------------------------------------------

    pub async fn list_products(&self, request: &PageRequest, extra: &Filters) -> ResultEnvelope<Arc<PageResult>> {
        self.products.list_page(request, extra).await
    }

    pub async fn list_products_with(
        &self,
        request: &PageRequest,
        extra: &Filters,
        strategy: CacheStrategy,
    ) -> ResultEnvelope<Arc<PageResult>> {
        self.products.list_page_with(request, extra, strategy).await
    }

    pub async fn list_recipes(&self, request: &PageRequest, extra: &Filters) -> ResultEnvelope<Arc<PageResult>> {
        self.recipes.list_page(request, extra).await
    }

    pub async fn list_recipes_with(
        &self,
        request: &PageRequest,
        extra: &Filters,
        strategy: CacheStrategy,
    ) -> ResultEnvelope<Arc<PageResult>> {
        self.recipes.list_page_with(request, extra, strategy).await
    }

    /// Drop every cached page of `entity` (`"produtos"`, `"receitas"`).
    pub fn invalidate_cache(&self, entity: &str) -> usize {
        let removed = self
            .cache
            .clear_matching(&CacheKeyBuilder::entity_prefix(entity));
        debug!("✓ {} cache invalidated ({} pages)", entity, removed);
        removed
    }

    pub fn invalidate_all(&self) {
        self.cache.log_stats();
        self.cache.clear();
    }

    // ------------------------------------------------------------------
    // Costs
    // ------------------------------------------------------------------

    /// Recompute and persist a recipe's cost. A recipe without ingredients
    /// succeeds with `0.00`; an unknown recipe is a 404 envelope.
    pub async fn recompute_cost(&self, recipe_id: i64) -> ResultEnvelope<BigDecimal> {
        let result = self.costs.recompute_cost(recipe_id).await;
        if result.is_ok() {
            self.recipes.invalidate_cache();
        }
        ResultEnvelope::from_result(result, "Cost recomputed")
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    pub async fn get_product(&self, id: i64) -> ResultEnvelope<Product> {
        ResultEnvelope::from_result(self.products.get_by_id(id).await, "Product found")
    }

    pub async fn create_product(&self, product: &NewProduct) -> ResultEnvelope<Product> {
        ResultEnvelope::from_result(self.try_create_product(product).await, "Product created")
    }

    pub async fn update_product(&self, id: i64, product: &NewProduct) -> ResultEnvelope<Product> {
        ResultEnvelope::from_result(self.try_update_product(id, product).await, "Product updated")
    }

    pub async fn delete_product(&self, id: i64) -> ResultEnvelope<()> {
        ResultEnvelope::from_unit(self.try_delete_product(id).await, "Product deleted")
    }

    async fn try_create_product(&self, product: &NewProduct) -> Result<Product> {
        product.validate()?;
        let outcome = self
            .store
            .execute(
                "INSERT INTO produtos (nome, categoria_id, unidade, custo_unitario, estoque) \
                 VALUES (?, ?, ?, ?, ?)",
                &product_params(product),
            )
            .await
            .map_err(|e| duplicate_name(e, "product", &product.name))?;
        self.products.invalidate_cache();

        info!("✓ product {} created: {}", outcome.last_insert_id, product.name);
        self.products.get_by_id(outcome.last_insert_id).await
    }

    async fn try_update_product(&self, id: i64, product: &NewProduct) -> Result<Product> {
        product.validate()?;
        let mut params = product_params(product);
        params.push(Scalar::Integer(id));

        let outcome = self
            .store
            .execute(
                "UPDATE produtos SET nome = ?, categoria_id = ?, unidade = ?, custo_unitario = ?, estoque = ? \
                 WHERE id = ?",
                &params,
            )
            .await
            .map_err(|e| duplicate_name(e, "product", &product.name))?;
        if outcome.affected_rows == 0 {
            return Err(not_found(Product::entity_name(), id));
        }
        self.products.invalidate_cache();

        let recomputed = self.costs.recompute_for_product(id).await;
        self.recipes.invalidate_cache();
        let recomputed = recomputed?;

        info!(
            "✓ product {} updated ({} recipe costs recomputed)",
            id,
            recomputed.len()
        );
        self.products.get_by_id(id).await
    }

    async fn try_delete_product(&self, id: i64) -> Result<()> {
        let outcome = self
            .store
            .execute("DELETE FROM produtos WHERE id = ?", &[Scalar::Integer(id)])
            .await
            .map_err(|e| match e {
                Error::Constraint(_) => {
                    Error::Constraint(format!("product {} is used by at least one recipe", id))
                }
                other => other,
            })?;
        if outcome.affected_rows == 0 {
            return Err(not_found(Product::entity_name(), id));
        }
        self.products.invalidate_cache();
        info!("✓ product {} deleted", id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Recipes
    // ------------------------------------------------------------------

    pub async fn get_recipe(&self, id: i64) -> ResultEnvelope<Recipe> {
        ResultEnvelope::from_result(self.recipes.get_by_id(id).await, "Recipe found")
    }

    /// Create a recipe with its initial ingredients and compute its cost.
    ///
    /// Each statement commits on its own: if an ingredient insert fails, the
    /// recipe and the ingredients before it remain, and the stored cost
    /// covers exactly those lines.
    pub async fn create_recipe(&self, recipe: &NewRecipe, ingredients: &[NewIngredient]) -> ResultEnvelope<Recipe> {
        ResultEnvelope::from_result(self.try_create_recipe(recipe, ingredients).await, "Recipe created")
    }

    pub async fn update_recipe(&self, id: i64, recipe: &NewRecipe) -> ResultEnvelope<Recipe> {
        ResultEnvelope::from_result(self.try_update_recipe(id, recipe).await, "Recipe updated")
    }

    /// Delete a recipe; its ingredient lines go with it.
    pub async fn delete_recipe(&self, id: i64) -> ResultEnvelope<()> {
        ResultEnvelope::from_unit(self.try_delete_recipe(id).await, "Recipe deleted")
    }

    async fn try_create_recipe(&self, recipe: &NewRecipe, ingredients: &[NewIngredient]) -> Result<Recipe> {
        recipe.validate()?;
        for ingredient in ingredients {
            ingredient.validate()?;
        }

        let outcome = self
            .store
            .execute(
                "INSERT INTO receitas (nome, categoria_id, rendimento, modo_preparo) VALUES (?, ?, ?, ?)",
                &recipe_params(recipe),
            )
            .await
            .map_err(|e| duplicate_name(e, "recipe", &recipe.name))?;
        let recipe_id = outcome.last_insert_id;
        self.recipes.invalidate_cache();

        let mut inserted = Ok(());
        for ingredient in ingredients {
            if let Err(e) = self.insert_ingredient(recipe_id, ingredient).await {
                inserted = Err(e);
                break;
            }
        }

        let cost = self.costs.recompute_cost(recipe_id).await;
        self.recipes.invalidate_cache();
        inserted?;
        let cost = cost?;

        info!(
            "✓ recipe {} created: {} ({} ingredients, cost {})",
            recipe_id,
            recipe.name,
            ingredients.len(),
            cost
        );
        self.recipes.get_by_id(recipe_id).await
    }

    async fn try_update_recipe(&self, id: i64, recipe: &NewRecipe) -> Result<Recipe> {
        recipe.validate()?;
        let mut params = recipe_params(recipe);
        params.push(Scalar::Integer(id));

        let outcome = self
            .store
            .execute(
                "UPDATE receitas SET nome = ?, categoria_id = ?, rendimento = ?, modo_preparo = ? WHERE id = ?",
                &params,
            )
            .await
            .map_err(|e| duplicate_name(e, "recipe", &recipe.name))?;
        if outcome.affected_rows == 0 {
            return Err(not_found(Recipe::entity_name(), id));
        }
        self.recipes.invalidate_cache();
        info!("✓ recipe {} updated", id);
        self.recipes.get_by_id(id).await
    }

    async fn try_delete_recipe(&self, id: i64) -> Result<()> {
        let outcome = self
            .store
            .execute("DELETE FROM receitas WHERE id = ?", &[Scalar::Integer(id)])
            .await?;
        if outcome.affected_rows == 0 {
            return Err(not_found(Recipe::entity_name(), id));
        }
        self.recipes.invalidate_cache();
        info!("✓ recipe {} deleted", id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Ingredients
    // ------------------------------------------------------------------

    /// Ingredient lines of a recipe with current product costs.
    pub async fn recipe_ingredients(&self, recipe_id: i64) -> ResultEnvelope<Vec<Ingredient>> {
        let result = match self.recipes.get_by_id(recipe_id).await {
            Ok(_) => self.costs.ingredients(recipe_id).await,
            Err(e) => Err(e),
        };
        ResultEnvelope::from_result(result, "Ingredients listed")
    }

    /// Add a line to a recipe. Returns the recipe with its new cost.
    pub async fn add_ingredient(&self, recipe_id: i64, ingredient: &NewIngredient) -> ResultEnvelope<Recipe> {
        ResultEnvelope::from_result(self.try_add_ingredient(recipe_id, ingredient).await, "Ingredient added")
    }

    /// Change a line's quantity. Returns the owning recipe with its new cost.
    pub async fn update_ingredient(&self, ingredient_id: i64, quantity: &BigDecimal) -> ResultEnvelope<Recipe> {
        ResultEnvelope::from_result(
            self.try_update_ingredient(ingredient_id, quantity).await,
            "Ingredient updated",
        )
    }

    /// Remove a line. Returns the owning recipe with its new cost.
    pub async fn remove_ingredient(&self, ingredient_id: i64) -> ResultEnvelope<Recipe> {
        ResultEnvelope::from_result(self.try_remove_ingredient(ingredient_id).await, "Ingredient removed")
    }

    async fn try_add_ingredient(&self, recipe_id: i64, ingredient: &NewIngredient) -> Result<Recipe> {
        ingredient.validate()?;
        self.recipes.get_by_id(recipe_id).await?;
        self.insert_ingredient(recipe_id, ingredient).await?;
        self.refresh_recipe_cost(recipe_id).await
    }

    async fn try_update_ingredient(&self, ingredient_id: i64, quantity: &BigDecimal) -> Result<Recipe> {
        validate_quantity(quantity)?;
        let recipe_id = self.ingredient_owner(ingredient_id).await?;
        self.store
            .execute(
                "UPDATE ingredientes_receita SET quantidade = ? WHERE id = ?",
                &[Scalar::Text(quantity.to_string()), Scalar::Integer(ingredient_id)],
            )
            .await?;
        debug!("ingredient {} quantity set to {}", ingredient_id, quantity);
        self.refresh_recipe_cost(recipe_id).await
    }

    async fn try_remove_ingredient(&self, ingredient_id: i64) -> Result<Recipe> {
        let recipe_id = self.ingredient_owner(ingredient_id).await?;
        self.store
            .execute(
                "DELETE FROM ingredientes_receita WHERE id = ?",
                &[Scalar::Integer(ingredient_id)],
            )
            .await?;
        debug!("ingredient {} removed from recipe {}", ingredient_id, recipe_id);
        self.refresh_recipe_cost(recipe_id).await
    }

    async fn insert_ingredient(&self, recipe_id: i64, ingredient: &NewIngredient) -> Result<i64> {
        let outcome = self
            .store
            .execute(
                "INSERT INTO ingredientes_receita (receita_id, produto_id, quantidade) VALUES (?, ?, ?)",
                &[
                    Scalar::Integer(recipe_id),
                    Scalar::Integer(ingredient.product_id),
                    Scalar::Text(ingredient.quantity.to_string()),
                ],
            )
            .await
            .map_err(|e| match e {
                Error::Constraint(_) => Error::Constraint(format!(
                    "product {} does not exist or is already in recipe {}",
                    ingredient.product_id, recipe_id
                )),
                other => other,
            })?;
        debug!(
            "ingredient {} added to recipe {} (product {})",
            outcome.last_insert_id, recipe_id, ingredient.product_id
        );
        Ok(outcome.last_insert_id)
    }

    async fn ingredient_owner(&self, ingredient_id: i64) -> Result<i64> {
        let owner = self
            .store
            .fetch_scalar(
                "SELECT receita_id FROM ingredientes_receita WHERE id = ?",
                &[Scalar::Integer(ingredient_id)],
            )
            .await?;
        owner
            .as_ref()
            .and_then(Value::as_i64)
            .ok_or_else(|| not_found("ingredient", ingredient_id))
    }

    /// Recompute after an ingredient change; the recipe pages are dropped
    /// even when the recompute fails.
    async fn refresh_recipe_cost(&self, recipe_id: i64) -> Result<Recipe> {
        let cost = self.costs.recompute_cost(recipe_id).await;
        self.recipes.invalidate_cache();
        cost?;
        self.recipes.get_by_id(recipe_id).await
    }
}

fn product_params(product: &NewProduct) -> Vec<Scalar> {
    vec![
        Scalar::Text(product.name.trim().to_string()),
        Scalar::from(product.category_id),
        Scalar::Text(product.unit.trim().to_string()),
        Scalar::Text(product.unit_cost.to_string()),
        Scalar::Text(product.stock.to_string()),
    ]
}

fn recipe_params(recipe: &NewRecipe) -> Vec<Scalar> {
    vec![
        Scalar::Text(recipe.name.trim().to_string()),
        Scalar::from(recipe.category_id),
        Scalar::Integer(recipe.yield_count),
        Scalar::from(recipe.instructions.clone()),
    ]
}

fn not_found(entity: &str, id: i64) -> Error {
    Error::NotFound(format!("{} {} does not exist", entity, id))
}

fn duplicate_name(e: Error, what: &str, name: &str) -> Error {
    match e {
        Error::Constraint(_) => Error::Constraint(format!("a {} named {:?} already exists", what, name.trim())),
        other => other,
    }
}
