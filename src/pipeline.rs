// 🏗️ Build Warehouse - Extract → Clean → Load
//
// One session for the whole load: transactions first, then clients. Any
// storage failure rolls the session back and aborts the load; per-record
// problems only ever skip that record.

use crate::cleaner::{ClientCleaner, TransactionCleaner};
use crate::loaders::LoaderFactory;
use crate::repository::{ClientRepository, TransactionRepository};
use crate::warehouse::{Session, Warehouse};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Records written between session flushes
pub const FLUSH_EVERY: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub transactions_loaded: usize,
    pub transactions_skipped: usize,
    pub clients_loaded: usize,
    pub clients_skipped: usize,
}

pub struct BuildWarehouse<'a> {
    warehouse: &'a Warehouse,
    loaders: LoaderFactory,
    transaction_cleaner: TransactionCleaner,
    client_cleaner: ClientCleaner,
}

impl<'a> BuildWarehouse<'a> {
    pub fn new(warehouse: &'a Warehouse) -> Self {
        BuildWarehouse {
            warehouse,
            loaders: LoaderFactory::new(),
            transaction_cleaner: TransactionCleaner::new(),
            client_cleaner: ClientCleaner::new(),
        }
    }

    pub fn with_loaders(mut self, loaders: LoaderFactory) -> Self {
        self.loaders = loaders;
        self
    }

    pub fn with_transaction_cleaner(mut self, cleaner: TransactionCleaner) -> Self {
        self.transaction_cleaner = cleaner;
        self
    }

    pub fn with_client_cleaner(mut self, cleaner: ClientCleaner) -> Self {
        self.client_cleaner = cleaner;
        self
    }

    pub fn execute(
        &self,
        transactions_path: &Path,
        clients_path: &Path,
        clear_existing: bool,
    ) -> Result<LoadSummary> {
        info!("Starting ETL pipeline");

        if clear_existing {
            self.warehouse
                .clear_all()
                .context("Failed to clear warehouse")?;
        }

        let session = self.warehouse.session();
        let outcome = self.load_all(&session, transactions_path, clients_path);

        if let Err(err) = &outcome {
            error!(error = %format!("{:#}", err), "ETL failed");
            if let Err(rollback_err) = session.rollback() {
                warn!(error = %rollback_err, "Rollback after failed load also failed");
            }
        }
        session.close().context("Failed to close load session")?;

        let summary = outcome?;
        info!(
            transactions_loaded = summary.transactions_loaded,
            clients_loaded = summary.clients_loaded,
            "ETL completed"
        );
        Ok(summary)
    }

    fn load_all(
        &self,
        session: &Session<'_>,
        transactions_path: &Path,
        clients_path: &Path,
    ) -> Result<LoadSummary> {
        let (transactions_loaded, transactions_skipped) =
            self.load_transactions(session, transactions_path)?;
        let (clients_loaded, clients_skipped) = self.load_clients(session, clients_path)?;

        session.commit().context("Failed to commit load")?;

        Ok(LoadSummary {
            transactions_loaded,
            transactions_skipped,
            clients_loaded,
            clients_skipped,
        })
    }

    fn load_transactions(&self, session: &Session<'_>, path: &Path) -> Result<(usize, usize)> {
        let loader = self.loaders.transaction_loader(path)?;
        let repo = TransactionRepository::new(session);

        let mut loaded = 0;
        let mut skipped = 0;
        for raw in loader.load(path)? {
            let Some(transaction) = self.transaction_cleaner.clean(raw) else {
                skipped += 1;
                continue;
            };

            repo.add(&transaction)
                .with_context(|| format!("Failed to store transaction {:?}", transaction.id))?;
            loaded += 1;
            if loaded % FLUSH_EVERY == 0 {
                session.flush()?;
                debug!(processed = loaded, "Processed transactions");
            }
        }

        info!(loaded, skipped, "Transactions loaded");
        Ok((loaded, skipped))
    }

    fn load_clients(&self, session: &Session<'_>, path: &Path) -> Result<(usize, usize)> {
        let loader = self.loaders.client_loader(path)?;
        let repo = ClientRepository::new(session);

        let mut loaded = 0;
        let mut skipped = 0;
        for raw in loader.load(path)? {
            let Some(client) = self.client_cleaner.clean(raw) else {
                skipped += 1;
                continue;
            };

            repo.add(&client)
                .with_context(|| format!("Failed to store client {:?}", client.id))?;
            loaded += 1;
            if loaded % FLUSH_EVERY == 0 {
                session.flush()?;
                debug!(processed = loaded, "Processed clients");
            }
        }

        info!(loaded, skipped, "Clients loaded");
        Ok((loaded, skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Transaction;
    use crate::loaders::DataLoader;
    use crate::repository::TransactionRepository;
    use std::fs;
    use std::path::PathBuf;
    use uuid::Uuid;

    const HEADER: &str =
        "transaction_id,client_id,transaction_date,service,amount,payment_method,city,consultant";

    fn write_inputs(dir: &Path, rows: &[String], clients: &str) -> (PathBuf, PathBuf) {
        let tx_path = dir.join("transactions.csv");
        let clients_path = dir.join("clients.json");
        fs::write(&tx_path, format!("{}\n{}\n", HEADER, rows.join("\n"))).unwrap();
        fs::write(&clients_path, clients).unwrap();
        (tx_path, clients_path)
    }

    fn row(client: &Uuid, amount: &str) -> String {
        format!(
            "{},{},2024-01-15 10:00:00,Tax planning,{},Cash,Moscow,Anna",
            Uuid::new_v4(),
            client,
            amount
        )
    }

    #[test]
    fn test_execute_loads_and_skips() {
        let dir = tempfile::tempdir().unwrap();
        let client = Uuid::new_v4();
        let (tx_path, clients_path) = write_inputs(
            dir.path(),
            &[row(&client, "100"), row(&client, "-5"), row(&client, "\"20,5\"")],
            &format!(r#"[{{"id": "{}", "age": 30, "net_worth": 5000}}, {{"id": "bad", "age": 30}}]"#, client),
        );

        let warehouse = Warehouse::open_in_memory().unwrap();
        let summary = BuildWarehouse::new(&warehouse)
            .execute(&tx_path, &clients_path, false)
            .unwrap();

        assert_eq!(
            summary,
            LoadSummary {
                transactions_loaded: 2,
                transactions_skipped: 1,
                clients_loaded: 1,
                clients_skipped: 1,
            }
        );

        let session = warehouse.session();
        assert_eq!(TransactionRepository::new(&session).count().unwrap(), 2);
    }

    #[test]
    fn test_reload_is_idempotent_and_clear_resets() {
        let dir = tempfile::tempdir().unwrap();
        let client = Uuid::new_v4();
        let (tx_path, clients_path) = write_inputs(
            dir.path(),
            &[row(&client, "10"), row(&client, "11")],
            &format!(r#"{{"id": "{}", "age": 30}}"#, client),
        );

        let warehouse = Warehouse::open_in_memory().unwrap();
        let use_case = BuildWarehouse::new(&warehouse);
        use_case.execute(&tx_path, &clients_path, false).unwrap();
        use_case.execute(&tx_path, &clients_path, false).unwrap();

        {
            let session = warehouse.session();
            assert_eq!(TransactionRepository::new(&session).count().unwrap(), 2);
        }

        let (tx_path, _) = write_inputs(dir.path(), &[row(&client, "99")], "");
        fs::write(&clients_path, format!(r#"{{"id": "{}"}}"#, client)).unwrap();
        use_case.execute(&tx_path, &clients_path, true).unwrap();

        let session = warehouse.session();
        assert_eq!(TransactionRepository::new(&session).count().unwrap(), 1);
    }

    #[test]
    fn test_missing_file_fails_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let client = Uuid::new_v4();
        let (tx_path, _) = write_inputs(dir.path(), &[row(&client, "10")], "[]");

        let warehouse = Warehouse::open_in_memory().unwrap();
        let absent = dir.path().join("absent.json");
        let result = BuildWarehouse::new(&warehouse).execute(&tx_path, &absent, false);
        assert!(result.is_err());

        let session = warehouse.session();
        assert_eq!(TransactionRepository::new(&session).count().unwrap(), 0);
    }

    #[test]
    fn test_storage_failure_rolls_back_whole_load() {
        // Loader that feeds a record the cleaner accepts but storage rejects
        struct PoisonedLoader;

        impl DataLoader<Transaction> for PoisonedLoader {
            fn name(&self) -> &'static str {
                "poisoned"
            }

            fn supports(&self, path: &Path) -> bool {
                path.extension().map_or(false, |e| e == "poison")
            }

            fn load(&self, _path: &Path) -> Result<Box<dyn Iterator<Item = Transaction>>> {
                let good = Transaction::new(Some(Uuid::new_v4().to_string()), 10.0)
                    .with_client(Uuid::new_v4().to_string())
                    .with_service("Tax planning")
                    .with_payment_method("Cash");
                let mut bad = good.clone();
                bad.id = Some(Uuid::new_v4().to_string());
                bad.amount = -1.0;
                Ok(Box::new(vec![good, bad].into_iter()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let tx_path = dir.path().join("input.poison");
        let clients_path = dir.path().join("clients.json");
        fs::write(&clients_path, "[]").unwrap();

        let mut loaders = LoaderFactory::new();
        loaders.register_transaction_loader(Box::new(PoisonedLoader));

        let warehouse = Warehouse::open_in_memory().unwrap();
        let use_case = BuildWarehouse::new(&warehouse)
            .with_loaders(loaders)
            .with_transaction_cleaner(TransactionCleaner::with_rules(Vec::new()));

        let err = use_case.execute(&tx_path, &clients_path, false).unwrap_err();
        assert!(format!("{:#}", err).contains("Integrity violation"));

        let session = warehouse.session();
        assert_eq!(TransactionRepository::new(&session).count().unwrap(), 0);
    }
}
