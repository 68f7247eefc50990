//! Credential bootstrap: repair the service role with admin credentials.
//!
//! Managed databases are often provisioned with only a master user. When
//! the service role's login is rejected at startup, a [`CredentialBootstrap`]
//! may create the role (or reset its password) and grant it access to the
//! service database, after which the connection is retried. This runs at
//! most once per startup and only when explicitly enabled.

use async_trait::async_trait;
use fib_core::config::{BootstrapConfig, StoreConfig};
use sqlx::Connection;
use sqlx::postgres::PgConnection;
use tracing::info;

use crate::error::{StateError, StateResult};
use crate::postgres::connect_options;

/// Schema object classes granted to the repaired role.
const OBJECT_KINDS: [&str; 3] = ["TABLES", "SEQUENCES", "FUNCTIONS"];

/// Strategy invoked after the store rejects the service credentials.
#[async_trait]
pub trait CredentialBootstrap: Send + Sync {
    async fn repair(&self) -> StateResult<()>;
}

/// Creates or updates a PostgreSQL login role using admin credentials.
pub struct PgRoleBootstrap {
    admin: StoreConfig,
    role: String,
    password: String,
}

impl PgRoleBootstrap {
    /// Build from the service store config plus the bootstrap section.
    ///
    /// Returns `None` unless bootstrap is enabled and admin credentials are set.
    pub fn from_config(store: &StoreConfig, bootstrap: &BootstrapConfig) -> Option<Self> {
        if !bootstrap.enabled {
            return None;
        }
        let admin_user = bootstrap.admin_user.clone()?;
        let admin_password = bootstrap.admin_password.clone()?;
        Some(Self {
            admin: StoreConfig {
                user: admin_user,
                password: admin_password,
                ..store.clone()
            },
            role: store.user.clone(),
            password: store.password.clone(),
        })
    }

    /// Statements that bring the role into the desired state.
    fn statements(&self, role_exists: bool) -> Vec<String> {
        let role = quote_ident(&self.role);
        let password = quote_literal(&self.password);
        let database = quote_ident(&self.admin.database);
        let mut stmts = Vec::with_capacity(9);
        if role_exists {
            stmts.push(format!("ALTER ROLE {role} WITH LOGIN PASSWORD {password}"));
        } else {
            stmts.push(format!("CREATE ROLE {role} WITH LOGIN PASSWORD {password}"));
        }
        stmts.push(format!("GRANT ALL PRIVILEGES ON DATABASE {database} TO {role}"));
        stmts.push(format!("GRANT ALL ON SCHEMA public TO {role}"));
        // Objects the admin already created, e.g. an existing `indices` table.
        for kind in OBJECT_KINDS {
            stmts.push(format!(
                "GRANT ALL PRIVILEGES ON ALL {kind} IN SCHEMA public TO {role}"
            ));
        }
        for kind in OBJECT_KINDS {
            stmts.push(format!(
                "ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT ALL PRIVILEGES ON {kind} TO {role}"
            ));
        }
        stmts
    }
}

#[async_trait]
impl CredentialBootstrap for PgRoleBootstrap {
    async fn repair(&self) -> StateResult<()> {
        let bootstrap_err = |e: sqlx::Error| StateError::Bootstrap(e.to_string());

        let mut conn = PgConnection::connect_with(&connect_options(&self.admin))
            .await
            .map_err(bootstrap_err)?;

        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_roles WHERE rolname = $1")
            .bind(&self.role)
            .fetch_optional(&mut conn)
            .await
            .map_err(bootstrap_err)?;

        for stmt in self.statements(exists.is_some()) {
            sqlx::query(&stmt)
                .execute(&mut conn)
                .await
                .map_err(bootstrap_err)?;
        }
        conn.close().await.map_err(bootstrap_err)?;

        info!(
            role = %self.role,
            created = exists.is_none(),
            "service role repaired with admin credentials"
        );
        Ok(())
    }
}

/// Quote a SQL identifier (`fib"x` → `"fib""x"`).
fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote a SQL string literal (`it's` → `'it''s'`).
fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}
