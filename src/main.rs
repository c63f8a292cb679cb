use anyhow::Result;
use faoscraper::{
    fetch::{datasets, zips},
    output,
    process::{self, ProcessError},
    vocab::{flags, geo},
};
use reqwest::Client;
use std::{collections::HashSet, fs, path::PathBuf, sync::Arc};
use tokio::{
    sync::{mpsc, Semaphore},
    time::Instant,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) configure dirs ───────────────────────────────────────────
    let client = Client::new();
    let source_dir = PathBuf::from("source");
    let zips_dir = PathBuf::from("datasets");
    let out_dir = PathBuf::from("ddf");

    for d in [&source_dir, &zips_dir, &out_dir] {
        fs::create_dir_all(d)?;
    }

    // ─── 3) prerequisites: metadata, flags, geo (fatal on failure) ───
    let dataset_list = datasets::load_metadata(&client, &source_dir).await?;
    let tags = datasets::DomainTags::from_datasets(&dataset_list);
    let flag_order = Arc::new(flags::fetch_flag_order(&client).await?);
    let (areas, memberships) = geo::fetch_definitions(&client).await?;
    let entities = geo::build_entities(&areas, &memberships);
    let geo_domain = Arc::new(geo::write_entities(&entities, &out_dir)?);
    info!(
        datasets = dataset_list.len(),
        geos = geo_domain.len(),
        "prerequisites ready"
    );

    // ─── 4) spawn downloader tasks ──────────────────────────────────
    let (tx, mut rx) = mpsc::channel::<Result<PathBuf, (String, String)>>(100);
    let dl_sem = Arc::new(Semaphore::new(3));
    let mut dl_handles = Vec::with_capacity(dataset_list.len());

    // archives already on disk but absent from the metadata still get a
    // chance (and will be skipped further down if no tag is known for them)
    let known: HashSet<String> = dataset_list
        .iter()
        .map(|d| d.file_name().to_string())
        .collect();
    let orphans: Vec<PathBuf> = glob::glob(&format!("{}/*.zip", zips_dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|p| {
            p.file_name()
                .map(|n| !known.contains(&n.to_string_lossy().to_string()))
                .unwrap_or(false)
        })
        .collect();
    dl_handles.push(tokio::spawn({
        let tx = tx.clone();
        async move {
            for path in orphans {
                let _ = tx.send(Ok(path)).await;
            }
        }
    }));

    for ds in &dataset_list {
        let client = client.clone();
        let url = ds.file_location.clone();
        let zips_dir = zips_dir.clone();
        let tx = tx.clone();
        let sem = dl_sem.clone();

        dl_handles.push(tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            let start = Instant::now();
            match zips::download_zip(&client, &url, &zips_dir).await {
                Ok(path) => {
                    info!(name = %path.display(), elapsed = ?start.elapsed(), "archive ready");
                    let _ = tx.send(Ok(path)).await;
                }
                Err(err) => {
                    let _ = tx.send(Err((url, err.to_string()))).await;
                }
            }
        }));
    }
    // drop the original sender so `rx.recv()` ends once all downloads complete
    drop(tx);

    // ─── 5) process archives as they arrive ─────────────────────────
    let mut all_concepts = Vec::new();
    let mut processed = 0usize;
    let mut skipped: Vec<String> = Vec::new();

    while let Some(msg) = rx.recv().await {
        match msg {
            Ok(zip_path) => {
                let name = zip_path.file_name().unwrap().to_string_lossy().to_string();
                let tag = match tags.get(&name) {
                    Some(t) => t.to_string(),
                    None => {
                        warn!(error = %ProcessError::MissingDomainTag(name.clone()), "archive skipped");
                        skipped.push(name);
                        continue;
                    }
                };
                info!(name = %name, dataset = %tag, "processing");

                let result = tokio::task::spawn_blocking({
                    let flag_order = Arc::clone(&flag_order);
                    let geo_domain = Arc::clone(&geo_domain);
                    let out_dir = out_dir.clone();
                    let zip_clone = zip_path.clone();
                    move || {
                        process::process_archive(
                            &zip_clone,
                            &tag,
                            &flag_order,
                            &geo_domain,
                            &out_dir,
                        )
                    }
                })
                .await?;

                match result {
                    Ok(concepts) => {
                        processed += 1;
                        all_concepts.extend(concepts);
                    }
                    Err(e) => {
                        error!("processing {} failed: {:#}", name, e);
                        skipped.push(name);
                    }
                }
            }
            Err((url, err)) => {
                error!("download error {}: {}", url, err);
                skipped.push(url);
            }
        }
    }

    // ─── 6) await all downloader tasks ───────────────────────────────
    for h in dl_handles {
        let _ = h.await;
    }

    // ─── 7) merge concepts and write the listings ───────────────────
    let merged = output::merge_concepts(all_concepts);
    output::write_concepts(&out_dir, &merged)?;
    output::write_discrete_concepts(&out_dir)?;

    info!(
        processed,
        failed = skipped.len(),
        concepts = merged.len(),
        "run complete"
    );
    if !skipped.is_empty() {
        warn!(archives = ?skipped, "skipped or failed this run");
    }
    Ok(())
}
