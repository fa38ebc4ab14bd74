//! Diagnostic rendering of a layer: every block of the graph with the
//! operations the layer decodes, optionally annotated per program point.

use std::fmt;

use covenant_ir::{Apc, BasicBlock, BlockKind, Context};
use prettyless::{Arena, DocAllocator, DocBuilder};

use crate::{CodeLayer, Decoder};

type ArenaDoc<'a> = DocBuilder<'a, Arena<'a>>;

/// Layout options of the layer printer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrintConfig {
    /// Indentation of the operations under a block header.
    pub tab_spaces: usize,
    pub max_width: usize,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            tab_spaces: 2,
            max_width: 120,
        }
    }
}

impl<D: Decoder> CodeLayer<D> {
    /// Render the layer, appending `annotate(apc)` to the operation at each
    /// root-context point where it returns a note.
    pub fn render(
        &self,
        config: &PrintConfig,
        annotate: impl Fn(&Apc) -> Option<String>,
    ) -> Result<String, fmt::Error> {
        let arena = Arena::new();
        let mut doc = arena.nil();
        for (i, block) in self.cfg().blocks().enumerate() {
            if i > 0 {
                doc += arena.hardline();
            }
            doc += self.block_doc(&arena, config, block, &annotate);
        }
        let mut buf = String::new();
        doc.render_fmt(config.max_width, &mut buf)?;
        Ok(strip_trailing_whitespace(&buf))
    }

    fn block_doc<'a>(
        &self,
        arena: &'a Arena<'a>,
        config: &PrintConfig,
        block: &BasicBlock,
        annotate: &impl Fn(&Apc) -> Option<String>,
    ) -> ArenaDoc<'a> {
        let mut header = match block.kind {
            BlockKind::Code { start, end } => format!("{} [{start}..{end})", block.id),
            BlockKind::Exit => return arena.text(format!("{} exit", block.id)),
            BlockKind::ExceptionExit => {
                return arena.text(format!("{} exception-exit", block.id));
            }
        };
        if let Some(owner) = block.owner {
            header.push_str(&format!(" in {owner}"));
        }
        header.push(':');

        let mut body = arena.nil();
        for index in 0..block.len() {
            let apc = Apc::new(block.id, index, Context::root());
            let offset = block.offset(index).map(|o| o.to_string()).unwrap_or_default();
            let mut line = match self.decode(&apc) {
                Some(op) => format!("{offset}: {op}"),
                None => format!("{offset}: <unreachable>"),
            };
            if let Some(note) = annotate(&apc) {
                line.push_str(&format!("  ; {note}"));
            }
            body += arena.hardline() + arena.text(line);
        }

        let successors: Vec<String> = self
            .cfg()
            .successor_edges(block.id)
            .map(|e| format!("{} ({})", e.to, e.kind))
            .collect();
        if !successors.is_empty() {
            body += arena.hardline() + arena.text(format!("-> {}", successors.join(", ")));
        }
        arena.text(header) + body.nest(config.tab_spaces as isize)
    }
}

fn strip_trailing_whitespace(s: &str) -> String {
    let mut res = String::with_capacity(s.len());
    for line in s.lines() {
        res.push_str(line.trim_end());
        res.push('\n');
    }
    res
}
