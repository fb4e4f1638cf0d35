use std::future::Future;

use trackeame_types::{Carrier, new_id};

use super::SqliteStore;

/// Reference data for one carrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarrierSeed {
    pub name: &'static str,
    pub slug: &'static str,
    pub website: Option<&'static str>,
}

/// The carriers the service knows about. `oca` is listed but has no adapter.
pub const REFERENCE_CARRIERS: &[CarrierSeed] = &[
    CarrierSeed {
        name: "Correo Argentino",
        slug: "correo-argentino",
        website: Some("https://www.correoargentino.com.ar/"),
    },
    CarrierSeed {
        name: "Andreani",
        slug: "andreani",
        website: Some("https://www.andreani.com/"),
    },
    CarrierSeed {
        name: "OCA",
        slug: "oca",
        website: Some("https://www.oca.com.ar/"),
    },
];

type CarrierRow = (String, String, String, Option<String>);

fn carrier_from_row((id, name, slug, website): CarrierRow) -> Carrier {
    Carrier {
        id,
        name,
        slug,
        website,
    }
}

pub trait CarrierStore: Send + Sync + 'static {
    /// Insert missing carriers and refresh name/website of existing ones.
    /// Returns how many rows were written.
    fn seed_carriers(
        &self,
        seeds: &[CarrierSeed],
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
    fn get_carrier(&self, id: &str) -> impl Future<Output = Result<Option<Carrier>, sqlx::Error>> + Send;
    fn get_carrier_by_slug(
        &self,
        slug: &str,
    ) -> impl Future<Output = Result<Option<Carrier>, sqlx::Error>> + Send;
    fn list_carriers(&self) -> impl Future<Output = Result<Vec<Carrier>, sqlx::Error>> + Send;
}

impl CarrierStore for SqliteStore {
    async fn seed_carriers(&self, seeds: &[CarrierSeed]) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for seed in seeds {
            let result = sqlx::query(
                "INSERT INTO carriers (id, name, slug, website) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (slug) DO UPDATE SET name = excluded.name, website = excluded.website \
                 WHERE name IS NOT excluded.name OR website IS NOT excluded.website",
            )
            .bind(new_id())
            .bind(seed.name)
            .bind(seed.slug)
            .bind(seed.website)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    async fn get_carrier(&self, id: &str) -> Result<Option<Carrier>, sqlx::Error> {
        let row: Option<CarrierRow> =
            sqlx::query_as("SELECT id, name, slug, website FROM carriers WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(carrier_from_row))
    }

    async fn get_carrier_by_slug(&self, slug: &str) -> Result<Option<Carrier>, sqlx::Error> {
        let row: Option<CarrierRow> =
            sqlx::query_as("SELECT id, name, slug, website FROM carriers WHERE slug = ?1")
                .bind(slug)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(carrier_from_row))
    }

    async fn list_carriers(&self) -> Result<Vec<Carrier>, sqlx::Error> {
        let rows: Vec<CarrierRow> =
            sqlx::query_as("SELECT id, name, slug, website FROM carriers ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(carrier_from_row).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.seed_carriers(REFERENCE_CARRIERS).await.unwrap(), 3);
        assert_eq!(store.seed_carriers(REFERENCE_CARRIERS).await.unwrap(), 0);

        let carriers = store.list_carriers().await.unwrap();
        let slugs: Vec<_> = carriers.iter().map(|c| c.slug.as_str()).collect();
        assert_eq!(slugs, vec!["andreani", "correo-argentino", "oca"]);

        let andreani = store.get_carrier_by_slug("andreani").await.unwrap().unwrap();
        assert_eq!(store.get_carrier(&andreani.id).await.unwrap(), Some(andreani));
        assert!(store.get_carrier_by_slug("dhl").await.unwrap().is_none());
    }
}
