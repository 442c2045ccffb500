//! Server-rendered HTML pages.

use axum::response::Html;

use crate::diagnosis::DIAGNOSIS_CLASSES;

const STYLE: &str = "body{font-family:sans-serif;max-width:48rem;margin:2rem auto;padding:0 1rem;color:#222}\
nav a{margin-right:1rem}img.preview{max-width:16rem;border:1px solid #ccc}\
.diagnosis{font-size:1.4rem;font-weight:bold}.error{color:#a00}";

fn layout(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title} | Skin Lesion Classifier</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <nav><a href=\"/home\">Home</a><a href=\"/learn\">Learn</a><a href=\"/try_now\">Try now</a>\
         <a href=\"/q2\">Upload</a></nav>\n<main>\n{body}\n</main>\n</body>\n</html>\n"
    ))
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn index() -> Html<String> {
    layout(
        "Home",
        "<h1>Skin Lesion Classifier</h1>\n\
         <p>Upload a photo of a skin lesion and a convolutional network trained on \
         dermatoscopic images suggests which of eight categories it most resembles.</p>\n\
         <p><a href=\"/try_now\">Try it now</a> or <a href=\"/learn\">learn about the categories</a>.</p>",
    )
}

pub fn try_now() -> Html<String> {
    layout(
        "Try now",
        "<h1>Try it now</h1>\n\
         <ol><li>Take a clear, well lit, close-up photo of the lesion.</li>\
         <li>Upload it on the <a href=\"/q2\">upload page</a>.</li>\
         <li>Read the suggested category and talk to a dermatologist about it.</li></ol>\n\
         <p>This tool is a demonstration and not a medical diagnosis.</p>",
    )
}

pub fn learn() -> Html<String> {
    let items: String = DIAGNOSIS_CLASSES
        .iter()
        .map(|label| format!("<li>{}</li>", escape(label)))
        .collect();
    layout(
        "Learn",
        &format!(
            "<h1>Lesion categories</h1>\n<p>The model chooses one of these categories:</p>\n<ul>{items}</ul>"
        ),
    )
}

const UPLOAD_FORM: &str = "<form method=\"post\" action=\"/q2\" enctype=\"multipart/form-data\">\
<input type=\"file\" name=\"file\" accept=\"image/*\" required> <button type=\"submit\">Classify</button></form>";

pub fn upload_form() -> Html<String> {
    layout(
        "Upload",
        &format!("<h1>Classify a lesion</h1>\n{UPLOAD_FORM}"),
    )
}

pub fn diagnosis(filename: &str, diagnosis: &str) -> Html<String> {
    let filename = escape(filename);
    let diagnosis = escape(diagnosis);
    layout(
        "Result",
        &format!(
            "<h1>Result</h1>\n\
             <p><img class=\"preview\" src=\"/q2/{filename}\" alt=\"{filename}\"></p>\n\
             <p>File: <code>{filename}</code></p>\n\
             <p class=\"diagnosis\">{diagnosis}</p>\n\
             <h2>Classify another</h2>\n{UPLOAD_FORM}"
        ),
    )
}

pub fn bad_request(message: &str) -> Html<String> {
    layout(
        "Bad request",
        &format!(
            "<h1>Upload failed</h1>\n<p class=\"error\">{}</p>\n{UPLOAD_FORM}",
            escape(message)
        ),
    )
}

pub fn not_found() -> Html<String> {
    layout(
        "Not found",
        "<h1>404</h1>\n<p>That page does not exist. <a href=\"/home\">Back home</a>.</p>",
    )
}

pub fn server_error() -> Html<String> {
    layout(
        "Server error",
        "<h1>500</h1>\n<p>Something went wrong while processing the image. Please try again.</p>",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape("<img src=x onerror='a&b'>\""),
            "&lt;img src=x onerror=&#x27;a&amp;b&#x27;&gt;&quot;"
        );
        assert_eq!(escape("lesion_1.png"), "lesion_1.png");
    }

    #[test]
    fn test_diagnosis_page_embeds_filename_and_label() {
        let Html(page) = diagnosis("mole.png", "Melanoma");
        assert!(page.contains("/q2/mole.png"));
        assert!(page.contains("<p class=\"diagnosis\">Melanoma</p>"));
    }

    #[test]
    fn test_learn_lists_every_class() {
        let Html(page) = learn();
        for label in DIAGNOSIS_CLASSES {
            assert!(page.contains(label), "missing {label}");
        }
    }

    #[test]
    fn test_upload_form_posts_file_field() {
        let Html(page) = upload_form();
        assert!(page.contains("name=\"file\""));
        assert!(page.contains("multipart/form-data"));
    }
}
