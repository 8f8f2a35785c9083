//! Check for the external tools merging depends on.

use anyhow::bail;
use montage_render::probe::tool_available;

const DEPENDENCIES: [(&str, &str, &str); 2] = [
    ("ffmpeg", "decoding clips and encoding output", "sudo apt install ffmpeg"),
    ("ffprobe", "reading clip durations", "sudo apt install ffmpeg"),
];

pub fn run() -> anyhow::Result<()> {
    println!("montage dependency check");
    println!("{}", "=".repeat(50));

    let mut missing = 0;
    for (bin, purpose, install) in DEPENDENCIES {
        if tool_available(bin) {
            println!("[OK] {bin} -- {purpose}");
        } else {
            missing += 1;
            println!("[MISSING] {bin} -- {purpose}");
            println!("          Install: {install}");
        }
    }

    println!();
    if missing > 0 {
        bail!("{missing} required tool(s) missing");
    }
    println!("All dependencies found. montage is ready.");
    Ok(())
}
