//! 七巧板命令行入口
//!
//! 用法：`tangram [--config <engine.json>] [--save <out.tangram>] [<puzzle file>]`
//!
//! 不给拼图文件时，通过编辑会话拼出一个示例拼装。

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tangram_core::catalog::PieceType;
use tangram_core::config::EngineConfig;
use tangram_core::connection::{Anchor, ConnectionPoint};
use tangram_core::math::CanvasSize;
use tangram_core::puzzle::Puzzle;
use tangram_core::validation::ValidationEngine;
use tangram_editor::{Editor, EditorResult};
use tangram_file::Document;

/// 默认画布尺寸
const CANVAS_WIDTH: f64 = 800.0;
const CANVAS_HEIGHT: f64 = 600.0;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    save: Option<PathBuf>,
    puzzle: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = Some(iter.next().context("--config needs a path")?.into()),
            "--save" => args.save = Some(iter.next().context("--save needs a path")?.into()),
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            _ => args.puzzle = Some(arg.into()),
        }
    }
    Ok(args)
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    info!("Loaded engine config from {}", path.display());
    Ok(config)
}

/// 示例拼装：正方形居中，右侧再接一个正方形，下方横跨大三角形，右上角挂一个小三角形
fn build_demo(config: EngineConfig) -> EditorResult<Puzzle> {
    let mut editor = Editor::new(Puzzle::new(), config, CanvasSize::new(CANVAS_WIDTH, CANVAS_HEIGHT));

    editor.choose_first_piece(PieceType::Square)?;
    let left = editor.commit_first_piece()?;

    editor.begin()?;
    editor.select_canvas_point(ConnectionPoint::edge(left.clone(), 1))?;
    editor.choose_pending_piece(PieceType::Square)?;
    editor.select_pending_point(Anchor::Edge(3))?;
    editor.preview_placement()?;
    let right = editor.commit_placement()?;

    editor.begin()?;
    editor.select_canvas_point(ConnectionPoint::vertex(left, 3))?;
    editor.select_canvas_point(ConnectionPoint::vertex(right.clone(), 2))?;
    editor.choose_pending_piece(PieceType::LargeTriangle1)?;
    editor.select_pending_point(Anchor::Vertex(0))?;
    editor.select_pending_point(Anchor::Vertex(1))?;
    editor.preview_placement()?;
    editor.commit_placement()?;

    editor.begin()?;
    editor.select_canvas_point(ConnectionPoint::vertex(right, 1))?;
    editor.choose_pending_piece(PieceType::SmallTriangle1)?;
    editor.select_pending_point(Anchor::Vertex(0))?;
    editor.rotate_pending_piece(-90.0)?;
    editor.preview_placement()?;
    editor.commit_placement()?;

    info!("{}", editor.description());
    Ok(editor.into_puzzle())
}

fn main() -> Result<()> {
    // 初始化日志（RUST_LOG 可覆盖默认级别）
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing::subscriber::set_global_default(FmtSubscriber::builder().with_env_filter(filter).finish())?;

    let args = parse_args()?;
    let config = load_config(args.config.as_ref())?;

    let document = match &args.puzzle {
        Some(path) => tangram_file::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => {
            info!("No puzzle file given, building demo assembly");
            Document::new(build_demo(config)?).with_title("示例拼装")
        }
    };

    let report = ValidationEngine::new(config).validate(&document.puzzle);
    info!(
        "\"{}\": {} pieces, {} connections",
        document.metadata.title,
        document.puzzle.piece_count(),
        document.puzzle.connections().len()
    );
    if report.is_valid() {
        info!("Assembly is valid");
    } else {
        for (a, b) in &report.overlaps {
            warn!("Overlap between {} and {}", a, b);
        }
        for (a, b) in &report.unexplained_contacts {
            warn!("Edge contact without connection between {} and {}", a, b);
        }
        for id in &report.unreachable {
            warn!("Piece {} is not connected to the first piece", id);
        }
    }

    if let Some(path) = &args.save {
        tangram_file::save(&document, path).with_context(|| format!("saving {}", path.display()))?;
    }

    Ok(())
}
