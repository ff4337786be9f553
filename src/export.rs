//! "download chat": write the transcript of a session out.
//!
//! native writes `chat_export_<model>.txt` into a directory; wasm hands the
//! browser a text/plain blob to download.

use bevy::log::info;

use crate::conversation::transcript_file_name;
use crate::error::ExportError;
use crate::session::Session;

#[cfg(not(target_arch = "wasm32"))]
pub fn export_transcript(
    session: &Session,
    dir: &std::path::Path,
) -> Result<std::path::PathBuf, ExportError> {
    if session.conversation.message_count() == 0 {
        return Err(ExportError::Empty);
    }
    std::fs::create_dir_all(dir)?;
    let path = dir.join(transcript_file_name(session.model.name()));
    std::fs::write(&path, session.conversation.transcript())?;
    info!(target: "bevy_llm_chat", "transcript written to {}", path.display());
    Ok(path)
}

#[cfg(target_arch = "wasm32")]
pub fn export_transcript(
    session: &Session,
    _dir: &std::path::Path,
) -> Result<std::path::PathBuf, ExportError> {
    use wasm_bindgen::{JsCast, JsValue};

    if session.conversation.message_count() == 0 {
        return Err(ExportError::Empty);
    }
    let js = |e: JsValue| ExportError::Browser(format!("{e:?}"));
    let name = transcript_file_name(session.model.name());

    let parts: JsValue = vec![JsValue::from_str(&session.conversation.transcript())].into();
    let opts = web_sys::BlobPropertyBag::new();
    opts.set_type("text/plain");
    let blob = web_sys::Blob::new_with_str_sequence_and_options(&parts, &opts).map_err(js)?;
    let url = web_sys::Url::create_object_url_with_blob(&blob).map_err(js)?;

    let document = web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| ExportError::Browser("no document".into()))?;
    let anchor: web_sys::HtmlAnchorElement =
        document.create_element("a").map_err(js)?.dyn_into().map_err(|_| {
            ExportError::Browser("anchor element cast failed".into())
        })?;
    anchor.set_href(&url);
    anchor.set_download(&name);
    anchor.click();
    web_sys::Url::revoke_object_url(&url).map_err(js)?;

    info!(target: "bevy_llm_chat", "transcript download started: {}", name);
    Ok(std::path::PathBuf::from(name))
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::catalog::ModelSelection;

    #[test]
    fn writes_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(ModelSelection::named("gemini-2.0-flash"), None);
        session.conversation.push_user("hi");
        session.conversation.push_assistant("hello");

        let path = export_transcript(&session, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "chat_export_gemini-2.0-flash.txt");
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "User: hi\n\nAssistant: hello\n\n");
    }

    #[test]
    fn empty_conversation_is_not_exported() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::default();
        assert!(matches!(export_transcript(&session, dir.path()), Err(ExportError::Empty)));
    }
}
