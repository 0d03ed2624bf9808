use super::VideoEncodeSettings;
use crate::plan::EncodePlan;

/// FFmpeg arguments for one size-constrained encode. Bitrate-driven rather than CRF-driven:
/// the plan's bitrate is what ties the output size to the budget.
pub fn build_video_args(
    input_path: &str,
    output_path: &str,
    plan: &EncodePlan,
    settings: &VideoEncodeSettings,
) -> Vec<String> {
    let codec = settings.effective_codec().to_string();
    let preset = settings.effective_preset();
    let tune = settings.effective_tune();

    log::debug!(
        target: "fit_size::engine::builder",
        "Building FFmpeg command: codec={}, video_bitrate={}, scale={:?}, input={} -> output={}",
        codec,
        plan.video_bitrate_bps,
        plan.scale,
        input_path,
        output_path
    );

    let mut args = vec![
        "-nostdin".to_string(),
        "-y".to_string(),
        "-threads".to_string(),
        "0".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
        "-i".to_string(),
        input_path.to_string(),
        "-c:v".to_string(),
        codec,
        "-b:v".to_string(),
        plan.video_bitrate_bps.to_string(),
        "-preset".to_string(),
        preset.to_string(),
    ];

    if !tune.is_empty() && tune != "none" {
        args.extend(["-tune".to_string(), tune.to_string()]);
    }

    if let Some((width, height)) = plan.output_size {
        args.extend(["-vf".to_string(), format!("scale={}:{}", width, height)]);
    }

    args.extend([
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        format!("{}k", plan.audio_bitrate_bps / 1000),
        "-ac".to_string(),
        settings.effective_audio_channels().to_string(),
    ]);

    if settings.effective_container() == "mp4" {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }

    args.push(output_path.to_string());
    args
}

/// Formats args for readable display: option and value on the same line when the next arg is a value.
pub fn format_args_for_display_multiline(args: &[String]) -> String {
    if args.is_empty() {
        return String::new();
    }
    let mut lines = Vec::new();
    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        let line = if arg.starts_with('-') && i + 1 < args.len() && !args[i + 1].starts_with('-') {
            let value = &args[i + 1];
            i += 2;
            format!("  {} {}", arg, value)
        } else {
            i += 1;
            format!("  {}", arg)
        };
        lines.push(line);
    }
    lines.join("\n")
}
