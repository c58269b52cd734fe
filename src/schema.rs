//! Tables for products, recipes and recipe ingredients.
//!
//! Decimal columns are `TEXT` holding the `BigDecimal` string, so values keep
//! their scale and precision. Checks and numeric ordering go through
//! `CAST(... AS REAL)`.

use crate::error::Result;
use crate::store::RelationalStore;

/// Table and statement pairs, in creation order.
const STATEMENTS: &[(&str, &str)] = &[
    (
        "produtos",
        "CREATE TABLE IF NOT EXISTS produtos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nome TEXT NOT NULL UNIQUE,
            categoria_id INTEGER,
            unidade TEXT NOT NULL DEFAULT 'un',
            custo_unitario TEXT NOT NULL DEFAULT '0' CHECK (CAST(custo_unitario AS REAL) >= 0),
            estoque TEXT NOT NULL DEFAULT '0'
        )",
    ),
    (
        "receitas",
        "CREATE TABLE IF NOT EXISTS receitas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nome TEXT NOT NULL UNIQUE,
            categoria_id INTEGER,
            rendimento INTEGER NOT NULL DEFAULT 1 CHECK (rendimento > 0),
            modo_preparo TEXT,
            custo_estimado TEXT NOT NULL DEFAULT '0.00'
        )",
    ),
    (
        "ingredientes_receita",
        "CREATE TABLE IF NOT EXISTS ingredientes_receita (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            receita_id INTEGER NOT NULL,
            produto_id INTEGER NOT NULL,
            quantidade TEXT NOT NULL CHECK (CAST(quantidade AS REAL) > 0),
            UNIQUE (receita_id, produto_id),
            FOREIGN KEY (receita_id) REFERENCES receitas(id) ON DELETE CASCADE,
            FOREIGN KEY (produto_id) REFERENCES produtos(id) ON DELETE RESTRICT
        )",
    ),
    (
        "idx_ingredientes_produto",
        "CREATE INDEX IF NOT EXISTS idx_ingredientes_produto
            ON ingredientes_receita (produto_id)",
    ),
    (
        "idx_produtos_categoria",
        "CREATE INDEX IF NOT EXISTS idx_produtos_categoria ON produtos (categoria_id)",
    ),
    (
        "idx_receitas_categoria",
        "CREATE INDEX IF NOT EXISTS idx_receitas_categoria ON receitas (categoria_id)",
    ),
];

/// Create any missing table or index. Safe to call on every start.
///
/// # Errors
///
/// Returns the first store error; earlier statements stay applied.
pub async fn ensure_schema<S: RelationalStore>(store: &S) -> Result<()> {
    for (name, sql) in STATEMENTS {
        store.execute(sql, &[]).await.map_err(|e| {
            error!("✗ failed to create {}: {}", name, e);
            e
        })?;
    }
    debug!("✓ schema ready ({} statements)", STATEMENTS.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::query::Scalar;
    use crate::store::SqliteStore;

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let store = SqliteStore::open_in_memory().expect("open");
        ensure_schema(&store).await.expect("first run");
        ensure_schema(&store).await.expect("second run");

        let tables = store
            .fetch_all(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .await
            .expect("tables");
        let names: Vec<&str> = tables
            .rows
            .iter()
            .filter_map(|row| row["name"].as_str())
            .collect();
        assert_eq!(names, vec!["ingredientes_receita", "produtos", "receitas"]);
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let store = SqliteStore::open_in_memory().expect("open");
        ensure_schema(&store).await.expect("schema");

        let err = store
            .execute(
                "INSERT INTO ingredientes_receita (receita_id, produto_id, quantidade) VALUES (?, ?, ?)",
                &[Scalar::Integer(1), Scalar::Integer(1), Scalar::from("2")],
            )
            .await
            .expect_err("dangling references");
        assert!(matches!(err, Error::Constraint(_)));
    }

    #[tokio::test]
    async fn test_quantity_must_be_positive() {
        let store = SqliteStore::open_in_memory().expect("open");
        ensure_schema(&store).await.expect("schema");
        store
            .execute("INSERT INTO produtos (nome, custo_unitario) VALUES ('Farinha', 3.5)", &[])
            .await
            .expect("product");
        store
            .execute("INSERT INTO receitas (nome) VALUES ('Pão')", &[])
            .await
            .expect("recipe");

        let err = store
            .execute(
                "INSERT INTO ingredientes_receita (receita_id, produto_id, quantidade) VALUES (1, 1, 0)",
                &[],
            )
            .await
            .expect_err("zero quantity");
        assert!(matches!(err, Error::Constraint(_)));
    }

    #[tokio::test]
    async fn test_decimal_columns_keep_scale() {
        let store = SqliteStore::open_in_memory().expect("open");
        ensure_schema(&store).await.expect("schema");
        store
            .execute(
                "INSERT INTO produtos (nome, custo_unitario) VALUES (?, ?)",
                &[Scalar::from("Farinha"), Scalar::from("17.50")],
            )
            .await
            .expect("product");
        store
            .execute("INSERT INTO receitas (nome) VALUES ('Pão')", &[])
            .await
            .expect("recipe");

        let cost = store
            .fetch_scalar("SELECT custo_unitario FROM produtos WHERE id = 1", &[])
            .await
            .expect("cost");
        assert_eq!(cost, Some(serde_json::json!("17.50")));
        let default_cost = store
            .fetch_scalar("SELECT custo_estimado FROM receitas WHERE id = 1", &[])
            .await
            .expect("default cost");
        assert_eq!(default_cost, Some(serde_json::json!("0.00")));

        let err = store
            .execute(
                "INSERT INTO produtos (nome, custo_unitario) VALUES (?, ?)",
                &[Scalar::from("Sal"), Scalar::from("-1.00")],
            )
            .await
            .expect_err("negative cost");
        assert!(matches!(err, Error::Constraint(_)));
    }
}
