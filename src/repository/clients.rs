// 👤 Client Repository - upsert + net-worth segmentation
//
// Segment boundaries live in `NetWorthLevel`; the SQL CASE below must agree
// with `NetWorthLevel::from_amount`.

use super::round2;
use crate::entities::client::{HIGH_NET_WORTH_FLOOR, LOW_NET_WORTH_CEILING};
use crate::entities::{Client, NetWorthLevel, UNKNOWN_SEGMENT};
use crate::error::StorageResult;
use crate::warehouse::Session;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

const UPSERT_CLIENT: &str = "
    INSERT INTO clients (id, age, gender, net_worth)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(id) DO UPDATE SET
        age = excluded.age,
        gender = excluded.gender,
        net_worth = excluded.net_worth";

/// Revenue of one net-worth level (inner join; clients without
/// transactions or without net worth do not contribute).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelRevenue {
    pub level: String,
    pub name: String,
    pub revenue: f64,
    pub count: i64,
}

/// Full segment statistics including clients with no transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRevenue {
    /// `LOW`, `MEDIUM`, `HIGH` or `UNKNOWN`
    pub segment: String,
    pub label: String,
    pub client_count: i64,
    pub total_revenue: f64,
    pub transaction_count: i64,
    pub avg_transaction: f64,
}

fn segment_label(code: &str) -> &'static str {
    NetWorthLevel::all()
        .into_iter()
        .find(|level| level.code() == code)
        .map(|level| level.label())
        .unwrap_or("Unknown net worth")
}

pub struct ClientRepository<'s, 'w> {
    session: &'s Session<'w>,
}

impl<'s, 'w> ClientRepository<'s, 'w> {
    pub fn new(session: &'s Session<'w>) -> Self {
        ClientRepository { session }
    }

    /// Insert or fully replace by id; clients without id are skipped.
    pub fn add(&self, client: &Client) -> StorageResult<bool> {
        let id = match client.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => {
                debug!("Skipping client without ID");
                return Ok(false);
            }
        };

        let conn = self.session.connection()?;
        let mut stmt = conn.prepare_cached(UPSERT_CLIENT)?;
        stmt.execute(params![id, client.age, client.gender.as_str(), client.net_worth])?;
        Ok(true)
    }

    pub fn add_many<I>(&self, clients: I) -> StorageResult<usize>
    where
        I: IntoIterator<Item = Client>,
    {
        let result = clients
            .into_iter()
            .try_fold(0usize, |written, client| {
                Ok::<_, crate::error::StorageError>(written + usize::from(self.add(&client)?))
            })
            .and_then(|written| self.session.flush().map(|_| written));

        if let Err(err) = &result {
            error!(error = %err, "Integrity error during bulk client insert");
            self.session.rollback()?;
        }
        result
    }

    pub fn count(&self) -> StorageResult<i64> {
        let conn = self.session.connection()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM clients", [], |row| row.get(0))?)
    }

    /// Delete a client. Its transactions are kept and lose their client
    /// reference instead of being cascaded.
    pub fn remove(&self, id: &str) -> StorageResult<bool> {
        let conn = self.session.connection()?;
        let detached = conn.execute(
            "UPDATE transactions SET client_id = NULL WHERE client_id = ?1",
            [id],
        )?;
        let deleted = conn.execute("DELETE FROM clients WHERE id = ?1", [id])?;

        if deleted > 0 {
            info!(client_id = id, detached, "Client removed");
        }
        Ok(deleted > 0)
    }

    /// Revenue and transaction count per LOW/MEDIUM/HIGH level. All three
    /// levels are always present, in that order.
    pub fn revenue_by_net_worth_level(&self) -> StorageResult<Vec<LevelRevenue>> {
        let conn = self.session.connection()?;
        let mut stmt = conn.prepare(
            "SELECT c.net_worth, SUM(t.amount), COUNT(t.id)
             FROM clients c
             JOIN transactions t ON t.client_id = c.id
             WHERE c.net_worth IS NOT NULL
             GROUP BY c.id",
        )?;

        let per_client = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, f64>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut levels: Vec<LevelRevenue> = NetWorthLevel::all()
            .into_iter()
            .map(|level| LevelRevenue {
                level: level.code().to_string(),
                name: level.label().to_string(),
                revenue: 0.0,
                count: 0,
            })
            .collect();

        for (net_worth, revenue, count) in per_client {
            let code = NetWorthLevel::from_amount(net_worth).code();
            if let Some(entry) = levels.iter_mut().find(|l| l.level == code) {
                entry.revenue += revenue.unwrap_or(0.0);
                entry.count += count;
            }
        }

        for entry in &mut levels {
            entry.revenue = round2(entry.revenue);
        }
        Ok(levels)
    }

    /// Per-segment client count, revenue, transaction count and average
    /// amount. Clients without transactions still count toward their segment;
    /// clients without net worth form the `UNKNOWN` segment. Highest revenue
    /// first.
    pub fn detailed_revenue_by_segment(&self) -> StorageResult<Vec<SegmentRevenue>> {
        let conn = self.session.connection()?;
        let mut stmt = conn.prepare(
            "SELECT
                CASE
                    WHEN c.net_worth IS NULL THEN ?1
                    WHEN c.net_worth < ?2 THEN 'LOW'
                    WHEN c.net_worth <= ?3 THEN 'MEDIUM'
                    ELSE 'HIGH'
                END AS segment,
                COUNT(DISTINCT c.id),
                COALESCE(SUM(t.amount), 0.0) AS total_revenue,
                COUNT(t.id),
                COALESCE(AVG(t.amount), 0.0)
             FROM clients c
             LEFT JOIN transactions t ON t.client_id = c.id
             GROUP BY segment
             ORDER BY total_revenue DESC, segment ASC",
        )?;

        let rows = stmt
            .query_map(
                params![UNKNOWN_SEGMENT, LOW_NET_WORTH_CEILING, HIGH_NET_WORTH_FLOOR],
                |row| {
                    let segment: String = row.get(0)?;
                    Ok(SegmentRevenue {
                        label: segment_label(&segment).to_string(),
                        segment,
                        client_count: row.get(1)?,
                        total_revenue: round2(row.get(2)?),
                        transaction_count: row.get(3)?,
                        avg_transaction: round2(row.get(4)?),
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Number of clients with no transaction referencing them.
    pub fn clients_without_transactions(&self) -> StorageResult<i64> {
        let conn = self.session.connection()?;
        Ok(conn.query_row(
            "SELECT COUNT(*)
             FROM clients c
             LEFT JOIN transactions t ON t.client_id = c.id
             WHERE t.id IS NULL",
            [],
            |row| row.get(0),
        )?)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Gender;
    use crate::repository::fixtures::{at, client, transaction};
    use crate::repository::TransactionRepository;
    use crate::warehouse::Warehouse;

    fn client_id(client: &Client) -> String {
        client.id.clone().unwrap()
    }

    #[test]
    fn test_add_twice_second_wins() {
        let warehouse = Warehouse::open_in_memory().unwrap();
        let session = warehouse.session();
        let repo = ClientRepository::new(&session);

        let first = client(Some(50_000.0));
        let second = Client::new(first.id.clone())
            .with_gender(Gender::Female)
            .with_net_worth(2_000_000.0);

        repo.add(&first).unwrap();
        repo.add(&second).unwrap();

        assert_eq!(repo.count().unwrap(), 1);
        let segments = repo.detailed_revenue_by_segment().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment, "HIGH");
    }

    #[test]
    fn test_segmentation_keeps_clients_without_transactions() {
        let warehouse = Warehouse::open_in_memory().unwrap();
        let session = warehouse.session();
        let clients = ClientRepository::new(&session);
        let transactions = TransactionRepository::new(&session);

        let buyer = client(Some(500_000.0));
        let idle = client(Some(5_000_000.0));
        let anonymous = client(None);
        clients
            .add_many(vec![buyer.clone(), idle.clone(), anonymous])
            .unwrap();
        transactions
            .add(&transaction(&client_id(&buyer), "Tax planning", 120.0, at(2024, 3, 1)))
            .unwrap();
        transactions
            .add(&transaction(&client_id(&buyer), "Tax planning", 80.0, at(2024, 3, 2)))
            .unwrap();

        let segments = clients.detailed_revenue_by_segment().unwrap();
        let codes: Vec<&str> = segments.iter().map(|s| s.segment.as_str()).collect();
        assert_eq!(codes, vec!["MEDIUM", "HIGH", "UNKNOWN"]);

        assert_eq!(segments[0].total_revenue, 200.0);
        assert_eq!(segments[0].transaction_count, 2);
        assert_eq!(segments[0].avg_transaction, 100.0);

        let high = &segments[1];
        assert_eq!(high.client_count, 1);
        assert_eq!(high.transaction_count, 0);
        assert_eq!(high.total_revenue, 0.0);
        assert_eq!(high.label, "High net worth");

        assert_eq!(clients.clients_without_transactions().unwrap(), 2);
    }

    #[test]
    fn test_low_segment_rounds_amount_half_up() {
        let warehouse = Warehouse::open_in_memory().unwrap();
        let session = warehouse.session();
        let clients = ClientRepository::new(&session);
        let transactions = TransactionRepository::new(&session);

        let owner = client(Some(50_000.0));
        clients.add(&owner).unwrap();
        transactions
            .add(&transaction(&client_id(&owner), "Tax planning", 99.995, at(2024, 3, 1)))
            .unwrap();
        session.commit().unwrap();

        let segments = clients.detailed_revenue_by_segment().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment, "LOW");
        assert_eq!(segments[0].client_count, 1);
        assert_eq!(segments[0].total_revenue, 100.00);
        assert_eq!(segments[0].transaction_count, 1);
    }

    #[test]
    fn test_segment_boundaries_in_sql() {
        let warehouse = Warehouse::open_in_memory().unwrap();
        let session = warehouse.session();
        let clients = ClientRepository::new(&session);

        clients
            .add_many(vec![client(Some(100_000.0)), client(Some(1_000_000.0))])
            .unwrap();

        let segments = clients.detailed_revenue_by_segment().unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].segment, "MEDIUM");
        assert_eq!(segments[0].client_count, 2);
    }

    #[test]
    fn test_revenue_by_level_inner_join() {
        let warehouse = Warehouse::open_in_memory().unwrap();
        let session = warehouse.session();
        let clients = ClientRepository::new(&session);
        let transactions = TransactionRepository::new(&session);

        let low = client(Some(10.0));
        let unknown = client(None);
        clients.add_many(vec![low.clone(), unknown.clone()]).unwrap();
        transactions
            .add(&transaction(&client_id(&low), "Tax planning", 10.5, at(2024, 3, 1)))
            .unwrap();
        transactions
            .add(&transaction(&client_id(&unknown), "Tax planning", 99.0, at(2024, 3, 1)))
            .unwrap();

        let levels = clients.revenue_by_net_worth_level().unwrap();
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[0].level, "LOW");
        assert_eq!(levels[0].revenue, 10.5);
        assert_eq!(levels[0].count, 1);
        assert_eq!(levels[1].count, 0);
        assert_eq!(levels[2].revenue, 0.0);
    }

    #[test]
    fn test_remove_nullifies_transactions() {
        let warehouse = Warehouse::open_in_memory().unwrap();
        let session = warehouse.session();
        let clients = ClientRepository::new(&session);
        let transactions = TransactionRepository::new(&session);

        let owner = client(Some(10.0));
        clients.add(&owner).unwrap();
        transactions
            .add(&transaction(&client_id(&owner), "Tax planning", 10.0, at(2024, 3, 1)))
            .unwrap();

        assert!(clients.remove(&client_id(&owner)).unwrap());
        assert!(!clients.remove(&client_id(&owner)).unwrap());
        assert_eq!(clients.count().unwrap(), 0);
        assert_eq!(transactions.count().unwrap(), 1);

        let orphaned: i64 = session
            .connection()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM transactions WHERE client_id IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(orphaned, 1);
    }

    #[test]
    fn test_empty_tables() {
        let warehouse = Warehouse::open_in_memory().unwrap();
        let session = warehouse.session();
        let clients = ClientRepository::new(&session);

        assert!(clients.detailed_revenue_by_segment().unwrap().is_empty());
        assert_eq!(clients.clients_without_transactions().unwrap(), 0);
        assert!(clients
            .revenue_by_net_worth_level()
            .unwrap()
            .iter()
            .all(|l| l.count == 0 && l.revenue == 0.0));
    }
}
