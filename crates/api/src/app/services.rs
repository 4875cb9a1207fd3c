//! Runtime wiring: picks storage backends from config and starts the
//! change-feed worker that feeds the document pipeline.

use std::sync::Arc;

use anyhow::Context;
use tokio::runtime::Handle;
use tracing::info;

use invoicer_events::InMemoryChangeFeed;
use invoicer_infra::{
    artifact_store::{ArtifactStore, FsArtifactStore, InMemoryArtifactStore, UrlSigner},
    change_dispatcher::{ChangeDispatcher, DispatcherConfig},
    config::{AppConfig, StorageBackend},
    invoice_table::{InMemoryInvoiceTable, InvoiceTable, PublishingInvoiceTable},
    pointer_index::{CustomerIndex, InMemoryPointerIndex, PointerIndex},
    resolver::Resolver,
    workers::{ChangeFeedWorker, WorkerConfig, WorkerHandle},
};
use invoicer_invoicing::{DocumentRenderer, PdfRenderer};

pub type SharedResolver = Resolver<Arc<dyn PointerIndex>, Arc<dyn ArtifactStore>>;

/// Handles shared by every request handler.
pub struct AppServices {
    pub region: String,
    pub invoices: Arc<dyn InvoiceTable>,
    pub customers: Arc<dyn CustomerIndex>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub signer: UrlSigner,
    pub resolver: SharedResolver,
    /// MIME type of stored artifacts.
    pub content_type: &'static str,
}

/// Services plus the background worker that must be shut down on exit.
pub struct AppRuntime {
    pub services: Arc<AppServices>,
    pub worker: WorkerHandle,
}

struct Backends {
    table: Arc<dyn InvoiceTable>,
    customers: Arc<dyn CustomerIndex>,
    pointers: Arc<dyn PointerIndex>,
    artifacts: Arc<dyn ArtifactStore>,
}

async fn open_backends(
    config: &AppConfig,
    feed: Arc<InMemoryChangeFeed>,
    signer: &UrlSigner,
) -> anyhow::Result<Backends> {
    let artifacts: Arc<dyn ArtifactStore> = match config.storage {
        StorageBackend::Memory => Arc::new(InMemoryArtifactStore::new(signer.clone())),
        StorageBackend::Fs | StorageBackend::Postgres => Arc::new(
            FsArtifactStore::open(&config.artifact_root, &config.artifact_bucket, signer.clone())
                .await
                .context("failed to open artifact store")?,
        ),
    };

    match config.storage {
        StorageBackend::Memory | StorageBackend::Fs => {
            let table = Arc::new(InMemoryInvoiceTable::new(config.customer_index.clone()));
            Ok(Backends {
                table: Arc::new(PublishingInvoiceTable::new(table.clone(), feed)),
                customers: table,
                pointers: Arc::new(InMemoryPointerIndex::new()),
                artifacts,
            })
        }
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres => {
            use invoicer_infra::invoice_table::PostgresInvoiceTable;
            use invoicer_infra::pointer_index::PostgresPointerIndex;

            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let pool = invoicer_infra::postgres::connect(url).await?;

            let table = Arc::new(PostgresInvoiceTable::new(
                pool.clone(),
                &config.invoice_table,
                config.customer_index.clone(),
            ));
            table.ensure_schema().await?;
            let pointers = PostgresPointerIndex::new(pool, &config.pointer_table);
            pointers.ensure_schema().await?;

            Ok(Backends {
                table: Arc::new(PublishingInvoiceTable::new(table.clone(), feed)),
                customers: table,
                pointers: Arc::new(pointers),
                artifacts,
            })
        }
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres => anyhow::bail!("built without postgres support"),
    }
}

/// Wire storage, the change feed, the dispatcher and its worker.
///
/// Must be called from within a tokio runtime; the worker drives the
/// dispatcher on that runtime.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppRuntime> {
    let signer = UrlSigner::new(config.presign_secret.as_bytes(), config.public_base_url.clone());
    let feed = Arc::new(InMemoryChangeFeed::new());
    let backends = open_backends(config, feed.clone(), &signer).await?;

    let renderer = PdfRenderer::new();
    let content_type = renderer.content_type();
    let dispatcher = ChangeDispatcher::new(
        renderer,
        backends.artifacts.clone(),
        backends.pointers.clone(),
        DispatcherConfig {
            step_timeout: config.step_timeout,
            max_concurrent_records: config.max_concurrent_records,
        },
    );
    let worker = ChangeFeedWorker::spawn(
        "invoice-documents",
        feed.as_ref(),
        dispatcher,
        Handle::current(),
        WorkerConfig {
            max_batch_size: config.max_batch_size,
            batch_window: config.batch_window,
        },
    )
    .context("failed to start change feed worker")?;

    let resolver = Resolver::new(backends.pointers, backends.artifacts.clone())
        .with_ttl(config.presign_ttl);

    info!(
        region = %config.region,
        invoice_table = %config.invoice_table,
        pointer_table = %config.pointer_table,
        bucket = %config.artifact_bucket,
        customer_index = %config.customer_index.name,
        storage = ?config.storage,
        "services wired"
    );

    Ok(AppRuntime {
        services: Arc::new(AppServices {
            region: config.region.clone(),
            invoices: backends.table,
            customers: backends.customers,
            artifacts: backends.artifacts,
            signer,
            resolver,
            content_type,
        }),
        worker,
    })
}
