// Compile Warnings
// Advisory messages shown before compiling

/// Warn when the pipeline image differs from the notebook server's image
///
/// Returns an empty list when there is nothing to say. An unknown base
/// image produces no warning.
pub fn compile_warnings(pipeline_image: &str, base_image: Option<&str>) -> Vec<String> {
    let Some(base_image) = base_image.filter(|image| !image.is_empty()) else {
        return Vec::new();
    };
    if pipeline_image.is_empty() || pipeline_image == base_image {
        return Vec::new();
    }

    vec![
        concat!(
            "The image used to create the notebook server differs from ",
            "the image selected for the pipeline."
        )
        .to_string(),
        format!("Pipeline image: {}", pipeline_image),
        format!("Notebook server image: {}", base_image),
        concat!(
            "Packages installed in the notebook server will not be available ",
            "in the pipeline steps unless the pipeline image provides them."
        )
        .to_string(),
    ]
}

/// Image the pipeline will use: the configured one, or the server's
pub fn effective_image<'a>(configured: &'a str, base_image: Option<&'a str>) -> &'a str {
    if configured.is_empty() {
        base_image.unwrap_or("")
    } else {
        configured
    }
}
