//! Terminal implementations of the interactive seams.

use async_trait::async_trait;
use luaveil_core::bitmask::MethodSelection;
use luaveil_core::orchestrator::{EscalationPrompt, MethodPrompt};
use luaveil_core::registry::MethodRegistry;
use luaveil_core::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

/// Toggle loop on stdin: a bit number flips a method, an empty line or
/// `done` submits. Every accepted toggle is published immediately, so the
/// orchestrator's selection bound keeps whatever was toggled so far.
pub struct TerminalMethodPrompt;

#[async_trait]
impl MethodPrompt for TerminalMethodPrompt {
    async fn select_methods(
        &self,
        registry: &MethodRegistry,
        selection: &watch::Sender<MethodSelection>,
    ) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            render(registry, *selection.borrow());
            println!("Toggle a method by bit number; empty line or 'done' submits.");
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };
            let input = line.trim();
            if input.is_empty() || input.eq_ignore_ascii_case("done") {
                return Ok(());
            }
            match input.parse::<u8>() {
                Ok(bit) => {
                    let mut current = *selection.borrow();
                    match current.toggle(registry, bit) {
                        Ok(()) => {
                            let _ = selection.send(current);
                        }
                        Err(err) => println!("{err}"),
                    }
                }
                Err(_) => println!("unrecognized input: {input}"),
            }
        }
    }
}

fn render(registry: &MethodRegistry, selection: MethodSelection) {
    println!("Obfuscation methods:");
    for method in registry.methods() {
        let marker = if selection.contains(method.bit_position) {
            "x"
        } else {
            " "
        };
        println!(
            "  [{marker}] {:>2}  {}",
            method.bit_position, method.display_name
        );
    }
}

/// Non-interactive selection resolved from `--methods`.
pub struct StaticSelection(pub u64);

#[async_trait]
impl MethodPrompt for StaticSelection {
    async fn select_methods(
        &self,
        registry: &MethodRegistry,
        selection: &watch::Sender<MethodSelection>,
    ) -> Result<()> {
        let _ = selection.send(MethodSelection::from_mask(registry, self.0)?);
        Ok(())
    }
}

/// Yes/no on stdin; anything but an explicit yes declines.
pub struct TerminalEscalationPrompt;

#[async_trait]
impl EscalationPrompt for TerminalEscalationPrompt {
    async fn confirm_escalation(&self, diagnostic: &str) -> Result<bool> {
        println!("Obfuscation failed:");
        println!("{diagnostic}");
        println!("Forward the original input and this diagnostic for operator review? [y/N]");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let Some(line) = lines.next_line().await? else {
            return Ok(false);
        };
        let answer = line.trim().to_ascii_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}
