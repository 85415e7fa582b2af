use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context};
use serde::Deserialize;
use serde_json::Value;

use paper_rank::rank::stars::star_rating;
use paper_rank::{config, logging, paper, rank_candidates_detailed, Candidate, ProviderConfig, Ranking, ReferenceItem};

/// What the feed and library clients hand us.
#[derive(Debug, Deserialize)]
struct RankInput {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    reference: Vec<ReferenceItem>,
    /// Raw library export entries, converted with `ReferenceItem::from_library_entry`.
    #[serde(default)]
    library: Vec<Value>,
}

fn main() {
    if let Err(e) = real_main() {
        eprintln!("[paper-rank] fatal error: {e:?}");
        log::error!("Fatal error: {:?}", e);
        std::process::exit(1);
    }
}

fn real_main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let debug = args.iter().any(|a| a == "--debug");
    logging::init_logging(debug)?;
    if debug {
        log::debug!("Debug mode is on.");
    }

    let max_papers = match read_arg_value(&args, "--max-papers").or_else(|| env_value(config::env::MAX_PAPER_NUM)) {
        Some(v) => parse_max_papers(&v)?,
        None => config::digest::DEFAULT_MAX_PAPERS,
    };

    let raw = match read_arg_value(&args, "--input") {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("failed reading input {path}"))?
        }
        None => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s).context("failed reading stdin")?;
            s
        }
    };
    let input: RankInput = serde_json::from_str(&raw).context("invalid JSON input")?;

    let mut reference = input.reference;
    reference.extend(paper::reference_from_library(&input.library));
    log::info!(
        "Loaded {} candidate papers and {} reference items",
        input.candidates.len(),
        reference.len()
    );

    let provider_config = ProviderConfig::default().with_env_overrides(env_value);

    log::info!("Reranking papers...");
    let ranking = rank_candidates_detailed(input.candidates, reference, &provider_config)
        .context("ranking aborted")?;

    let output = render_output(ranking, max_papers);
    let bytes = serde_json::to_vec_pretty(&output).context("failed serializing output")?;

    match read_arg_value(&args, "--output") {
        Some(path) => write_output(Path::new(&path), &bytes)?,
        None => {
            let mut out = std::io::stdout();
            out.write_all(&bytes)?;
            out.write_all(b"\n")?;
            out.flush().context("failed flushing stdout")?;
        }
    }

    log::info!("=== paper-rank finished ===");
    Ok(())
}

/// A non-negative limit, or `-1` for no limit.
fn parse_max_papers(v: &str) -> anyhow::Result<i64> {
    let n = v.trim().parse::<i64>().with_context(|| format!("invalid max papers value {v:?}"))?;
    if n < config::digest::UNLIMITED {
        bail!("invalid max papers value {v:?}: use a count >= 0, or {} for no limit", config::digest::UNLIMITED);
    }
    Ok(n)
}

fn render_output(ranking: Ranking, max_papers: i64) -> Value {
    let degraded_reason = ranking.degraded_reason().map(str::to_string);
    let mut papers = ranking.into_candidates();

    if max_papers != config::digest::UNLIMITED {
        papers.truncate(max_papers.max(0) as usize);
    }

    let papers: Vec<Value> = papers
        .into_iter()
        .map(|c| {
            let score = c.score.unwrap_or(0.0);
            serde_json::json!({
                "identifier": c.identifier,
                "title": c.title,
                "text": c.text,
                "score": score,
                "stars": star_rating(score),
            })
        })
        .collect();

    serde_json::json!({
        "ranked": degraded_reason.is_none(),
        "degradedReason": degraded_reason,
        "papers": papers,
    })
}

fn write_output(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("failed creating {}", parent.display()))?;
    }
    if path.is_dir() {
        bail!("output path {} is a directory", path.display());
    }
    std::fs::write(path, bytes).with_context(|| format!("failed writing {}", path.display()))?;
    log::info!("Wrote ranked digest to {}", path.display());
    Ok(())
}

fn read_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Environment lookup where an empty value counts as unset.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(id: &str, score: f64) -> Candidate {
        Candidate {
            score: Some(score),
            ..Candidate::new(id, "abstract")
        }
    }

    #[test]
    fn test_render_output_truncates_and_rates() {
        let ranking = Ranking::Ranked(vec![scored("a", 6.0), scored("b", 4.7), scored("c", 1.0)]);
        let out = render_output(ranking, 2);

        assert_eq!(out["ranked"], true);
        assert!(out["degradedReason"].is_null());
        let papers = out["papers"].as_array().unwrap();
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0]["identifier"], "a");
        assert_eq!(papers[0]["stars"], 5);
        assert_eq!(papers[1]["stars"], star_rating(4.7));
    }

    #[test]
    fn test_render_output_unlimited_and_degraded() {
        let ranking = Ranking::Degraded {
            candidates: vec![scored("a", 0.0), scored("b", 0.0), scored("c", 0.0)],
            reason: "no model".to_string(),
        };
        let out = render_output(ranking, config::digest::UNLIMITED);

        assert_eq!(out["ranked"], false);
        assert_eq!(out["degradedReason"], "no model");
        assert_eq!(out["papers"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_parse_max_papers() {
        assert_eq!(parse_max_papers("0").unwrap(), 0);
        assert_eq!(parse_max_papers("25").unwrap(), 25);
        assert_eq!(parse_max_papers("-1").unwrap(), config::digest::UNLIMITED);
        assert!(parse_max_papers("-2").is_err());
        assert!(parse_max_papers("ten").is_err());
    }

    #[test]
    fn test_read_arg_value() {
        let args: Vec<String> = ["paper_rank", "--input", "in.json", "--debug"].iter().map(|s| s.to_string()).collect();
        assert_eq!(read_arg_value(&args, "--input").as_deref(), Some("in.json"));
        assert_eq!(read_arg_value(&args, "--output"), None);
        assert_eq!(read_arg_value(&args, "--debug"), None);
    }

    #[test]
    fn test_input_accepts_library_entries() {
        let input: RankInput = serde_json::from_str(
            r#"{
                "candidates": [{"identifier": "2401.00001", "title": "T", "text": "abstract"}],
                "library": [{"data": {"abstractNote": "ref", "dateAdded": "2024-01-01T00:00:00Z"}}]
            }"#,
        )
        .unwrap();
        assert_eq!(input.candidates.len(), 1);
        assert!(input.reference.is_empty());
        assert_eq!(paper::reference_from_library(&input.library).len(), 1);
    }
}
