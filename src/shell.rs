//! Native dialog front end: "Load Music File" or "Exit", then a file picker.

use anyhow::Result;
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};

use crate::audio::decode::AUDIO_EXTENSIONS;
use crate::pipeline::{run_pipeline, RunContext};

const LOAD: &str = "Load Music File";
const EXIT: &str = "Exit";

/// Show the main dialog until the user picks "Exit" or closes it.
pub fn run(mut ctx: RunContext) -> Result<()> {
    log::info!("Starting dialog shell");
    loop {
        let choice = MessageDialog::new()
            .set_title("sonoscope")
            .set_description("Analyze an audio file and save its feature plots as PNG.")
            .set_level(MessageLevel::Info)
            .set_buttons(MessageButtons::OkCancelCustom(LOAD.into(), EXIT.into()))
            .show();

        match choice {
            MessageDialogResult::Custom(label) if label == LOAD => {}
            MessageDialogResult::Ok => {}
            _ => break,
        }

        let Some(path) = FileDialog::new()
            .set_title(LOAD)
            .add_filter("Audio", AUDIO_EXTENSIONS)
            .pick_file()
        else {
            log::debug!("File picker closed without a selection");
            continue;
        };

        match run_pipeline(&mut ctx, &path) {
            Ok(report) => {
                let message = format!(
                    "Analysis complete. The plot has been saved as '{}'.",
                    report.output.display()
                );
                println!("{message}");
                notify(MessageLevel::Info, &message);
            }
            Err(e) => {
                eprintln!("Error: {e}");
                notify(MessageLevel::Error, &format!("Could not analyze {}:\n{e}", path.display()));
            }
        }
        ctx.reset();
    }
    log::info!("Exiting");
    Ok(())
}

fn notify(level: MessageLevel, text: &str) {
    MessageDialog::new()
        .set_title("sonoscope")
        .set_description(text)
        .set_level(level)
        .set_buttons(MessageButtons::Ok)
        .show();
}
