//! Chunks Command
//!
//! Local preview of how a document would be split; makes no provider calls.

use std::path::Path;

use crate::ai::tokenizer::{estimate_tokens, split_into_chunks};
use crate::cli::ui::Output;
use crate::cli::util::read_input;
use crate::types::Result;

pub fn run(file: &Path, limit: usize) -> Result<()> {
    let text = read_input(file)?;
    let chunks = split_into_chunks(&text, limit);
    let out = Output::new();

    out.header(&format!("{}", file.display()));
    out.field("Characters", text.chars().count());
    out.field("Estimated tokens", estimate_tokens(&text));
    out.field("Chunk limit", limit);
    out.field("Chunks", chunks.len());
    println!();

    for (i, chunk) in chunks.iter().enumerate() {
        let chars = chunk.chars().count();
        let marker = if chars > limit { " (oversized paragraph)" } else { "" };
        out.item(&format!(
            "#{:<3} {:>8} chars  ~{:>7} tokens{}",
            i + 1,
            chars,
            estimate_tokens(chunk),
            marker
        ));
    }
    Ok(())
}
