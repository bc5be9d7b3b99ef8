//! Database schema definitions using sea-query.

use sea_query::Iden;

/// Replicated people table schema.
#[derive(Iden)]
pub enum Pessoas {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "nome"]
    Nome,
    #[iden = "email"]
    Email,
    #[iden = "updated_at"]
    UpdatedAt,
    #[iden = "replicated_at"]
    ReplicatedAt,
}

/// SQL for creating the people replica table.
pub const CREATE_PESSOAS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS pessoas (
    id TEXT PRIMARY KEY NOT NULL,
    nome TEXT NOT NULL,
    email TEXT,
    updated_at TEXT,
    replicated_at TEXT NOT NULL
);
"#;
