//! Server-rendered HTML for the upload page and its results.

use crate::image_codec::{EncodedImage, ACCEPTED_EXTENSIONS};
use html_escape::{encode_double_quoted_attribute, encode_text};
use otoscope_api::PredictionResult;
use std::fmt::Write;

const STYLE: &str = r#"
body { font-family: sans-serif; max-width: 720px; margin: 2rem auto; padding: 0 1rem; }
.preview img { max-width: 100%; margin-top: 1rem; }
.banner { padding: 0.75rem 1rem; border-radius: 0.4rem; margin: 0.75rem 0; }
.success { background: #e6f4ea; color: #1e4620; }
.info { background: #e8f0fe; color: #174ea6; }
.error { background: #fce8e6; color: #a50e0e; }
"#;

const PREVIEW_SCRIPT: &str = r#"
document.getElementById("file").addEventListener("change", function (event) {
  const file = event.target.files[0];
  if (!file) { return; }
  const preview = document.getElementById("preview");
  preview.src = URL.createObjectURL(file);
  preview.hidden = false;
  document.getElementById("upload-form").submit();
});
"#;

pub fn render_index() -> String {
    render_page(None, "")
}

pub fn render_prediction(image: &EncodedImage, result: &PredictionResult) -> String {
    let mut body = String::new();
    let _ = writeln!(
        body,
        r#"<div class="banner success">Predicted Class: {}</div>"#,
        encode_text(&result.predicted_class)
    );
    let _ = writeln!(
        body,
        r#"<div class="banner info">Confidence Score: {:.2}</div>"#,
        result.confidence_score
    );
    body.push_str("<h3>Class Probabilities</h3>\n<ul class=\"probabilities\">\n");
    for (class_name, probability) in result.class_probabilities.iter() {
        let _ = writeln!(
            body,
            "<li>{}: {:.2}</li>",
            encode_text(class_name),
            probability
        );
    }
    body.push_str("</ul>\n");

    render_page(Some(image), &body)
}

pub fn render_error(image: Option<&EncodedImage>, message: &str) -> String {
    let body = format!(
        "<div class=\"banner error\" role=\"alert\">Error: {}</div>\n",
        encode_text(message)
    );
    render_page(image, &body)
}

fn render_page(image: Option<&EncodedImage>, result_html: &str) -> String {
    let preview = match image {
        Some(image) => format!(
            r#"<img id="preview" src="{}" alt="Uploaded Image">"#,
            encode_double_quoted_attribute(&image.to_data_url())
        ),
        None => r#"<img id="preview" alt="Uploaded Image" hidden>"#.to_string(),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Otoscope Image Classification</title>
<style>{style}</style>
</head>
<body>
<h1>Otoscope Image Classification</h1>
<p>Upload an image of the ear canal for classification (supports .jpg, .jpeg, .png, .tiff).</p>
<form id="upload-form" action="/upload" method="post" enctype="multipart/form-data">
<label for="file">Choose an image...</label>
<input id="file" type="file" name="file" accept="{accept}">
<noscript><button type="submit">Classify</button></noscript>
</form>
<div class="preview">{preview}</div>
<section id="result">
{result_html}</section>
<script>{script}</script>
</body>
</html>
"#,
        style = STYLE,
        accept = ACCEPTED_EXTENSIONS,
        preview = preview,
        result_html = result_html,
        script = PREVIEW_SCRIPT,
    )
}
