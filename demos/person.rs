//! Store a person and look them up again by email.
//!
//! ```bash
//! RUST_LOG=debug cargo run --example person
//! ```

use memtab::{record_shape, Pool, PoolSettings};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct Person {
    email: String,
    name: String,
    age: i64,
}

record_shape!(Person { email, name, age });

fn main() -> memtab::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = PoolSettings::<Person>::of("email")?;
    let pool = Pool::start(settings)?;

    pool.create(Person {
        email: "john@doe.com".to_string(),
        name: "John Doe".to_string(),
        age: 49,
    })?;

    match pool.read("john@doe.com")? {
        Some(person) => tracing::info!(?person, "Found"),
        None => tracing::warn!("john@doe.com not found"),
    }

    pool.shutdown()
}
