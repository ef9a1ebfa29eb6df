use super::*;
use crate::persistence::{PostgresConnection, PostgresPersistence, PostgresTransaction};

pub struct PostgresProgressTracker;

impl PostgresProgressTracker {
    pub fn new_shared() -> SharedProgressTracker<PostgresPersistence> {
        Arc::new(Self)
    }
}

impl ProgressTracker for PostgresProgressTracker {
    type Persistence = PostgresPersistence;

    fn load(&self, conn: &mut PostgresConnection, id: ServiceIdRef) -> Result<Option<Offset>> {
        conn.query_opt(
            r#"SELECT "offset" FROM service_progress WHERE service_id = $1"#,
            &[&id],
        )?
        .map::<Result<_>, _>(|row| Ok(Offset::try_from(row.get::<_, i64>("offset"))?))
        .transpose()
    }

    fn store_tr<'a>(
        &self,
        conn: &mut PostgresTransaction<'a>,
        id: ServiceIdRef,
        offset: Offset,
    ) -> Result<()> {
        conn.execute(
            r#"INSERT INTO service_progress (service_id, "offset") VALUES ($1, $2)
               ON CONFLICT (service_id) DO UPDATE SET "offset" = EXCLUDED."offset""#,
            &[&id, &i64::try_from(offset)?],
        )?;
        Ok(())
    }
}
