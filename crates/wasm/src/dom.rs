use std::cell::RefCell;
use std::collections::HashMap;

use ember_core::{
    EntryId, OpenDecorator, PanelView, Speaker, SurfaceView, TranscriptEntry, TranscriptObserver,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{Document, HtmlElement, HtmlIFrameElement, HtmlInputElement, Window};

const GLOW_MILLIS: i32 = 1200;

pub const STYLES: &str = r#"
.ember-root { position: fixed; right: 20px; bottom: 20px; z-index: 2147483000; font-family: system-ui, sans-serif; }
.ember-bubble { width: 56px; height: 56px; border-radius: 50%; border: none; cursor: pointer; background: #e2572b; color: #fff; font-size: 24px; box-shadow: 0 4px 14px rgba(0,0,0,.25); }
.ember-bubble.ember-glow { box-shadow: 0 0 0 6px rgba(226,87,43,.35), 0 4px 14px rgba(0,0,0,.25); transition: box-shadow .6s ease; }
.ember-panel { display: none; position: absolute; right: 0; bottom: 72px; width: 360px; height: 480px; flex-direction: column; background: #fff; border-radius: 12px; box-shadow: 0 8px 28px rgba(0,0,0,.2); overflow: hidden; }
.ember-panel.ember-open { display: flex; }
.ember-header { display: flex; align-items: center; gap: 8px; padding: 8px 12px; background: #e2572b; color: #fff; }
.ember-header .ember-title { flex: 1; font-weight: 600; }
.ember-header button { background: transparent; border: none; color: inherit; cursor: pointer; }
.ember-frame { flex: 1; border: none; width: 100%; }
.ember-surface { display: flex; flex-direction: column; flex: 1; min-height: 0; }
.ember-transcript { flex: 1; overflow-y: auto; padding: 12px; display: flex; flex-direction: column; gap: 8px; }
.ember-line { max-width: 85%; padding: 8px 10px; border-radius: 10px; white-space: pre-wrap; }
.ember-user { align-self: flex-end; background: #fde3d9; }
.ember-assistant { align-self: flex-start; background: #f1f1f1; }
.ember-pending { opacity: .6; font-style: italic; }
.ember-form { display: flex; gap: 6px; padding: 8px; border-top: 1px solid #eee; }
.ember-input { flex: 1; padding: 8px; border: 1px solid #ddd; border-radius: 8px; }
"#;

/// Inline chat surface: transcript list plus input row.
#[derive(Clone)]
pub struct SurfaceDom {
    pub transcript: HtmlElement,
    pub input: HtmlInputElement,
    pub send: HtmlElement,
}

pub enum PanelBody {
    Inline(SurfaceDom),
    Frame(HtmlIFrameElement),
}

/// Everything the host page shows.
pub struct WidgetDom {
    pub bubble: HtmlElement,
    pub panel: HtmlElement,
    pub close: HtmlElement,
    pub reindex: Option<HtmlElement>,
    pub body: PanelBody,
}

pub fn install_styles(document: &Document) -> Result<(), JsValue> {
    let style = document.create_element("style")?;
    style.set_text_content(Some(STYLES));
    let head = document.head().ok_or_else(|| JsValue::from_str("document has no head"))?;
    head.append_child(&style)?;
    Ok(())
}

pub fn build_widget(
    document: &Document,
    surface_url: Option<&str>,
    admin: bool,
) -> Result<WidgetDom, JsValue> {
    let root = element(document, "div", "ember-root")?;

    let bubble = element(document, "button", "ember-bubble")?;
    bubble.set_text_content(Some("💬"));
    bubble.set_attribute("aria-label", "Open assistant")?;
    bubble.set_attribute("aria-expanded", "false")?;

    let panel = element(document, "div", "ember-panel")?;
    panel.set_attribute("role", "dialog")?;

    let header = element(document, "div", "ember-header")?;
    let title = element(document, "span", "ember-title")?;
    title.set_text_content(Some("Assistant"));
    header.append_child(&title)?;

    let reindex = if admin {
        let button = element(document, "button", "ember-reindex")?;
        button.set_text_content(Some("Reindex"));
        button.set_attribute("title", "Rebuild the knowledge base")?;
        header.append_child(&button)?;
        Some(button)
    } else {
        None
    };

    let close = element(document, "button", "ember-close")?;
    close.set_text_content(Some("×"));
    close.set_attribute("aria-label", "Close assistant")?;
    header.append_child(&close)?;
    panel.append_child(&header)?;

    let body = match surface_url {
        Some(url) => {
            let frame = document
                .create_element("iframe")?
                .dyn_into::<HtmlIFrameElement>()?;
            frame.set_class_name("ember-frame");
            frame.set_src(url);
            frame.set_attribute("title", "Assistant chat")?;
            panel.append_child(&frame)?;
            PanelBody::Frame(frame)
        }
        None => PanelBody::Inline(build_surface(document, &panel)?),
    };

    root.append_child(&panel)?;
    root.append_child(&bubble)?;
    let page_body = document.body().ok_or_else(|| JsValue::from_str("document has no body"))?;
    page_body.append_child(&root)?;

    Ok(WidgetDom {
        bubble,
        panel,
        close,
        reindex,
        body,
    })
}

pub fn build_surface(document: &Document, parent: &HtmlElement) -> Result<SurfaceDom, JsValue> {
    let container = element(document, "div", "ember-surface")?;
    let transcript = element(document, "div", "ember-transcript")?;
    transcript.set_attribute("aria-live", "polite")?;

    let form = element(document, "div", "ember-form")?;
    let input = document
        .create_element("input")?
        .dyn_into::<HtmlInputElement>()?;
    input.set_class_name("ember-input");
    input.set_placeholder("Ask a question…");
    let send = element(document, "button", "ember-send")?;
    send.set_text_content(Some("Send"));

    form.append_child(&input)?;
    form.append_child(&send)?;
    container.append_child(&transcript)?;
    container.append_child(&form)?;
    parent.append_child(&container)?;

    Ok(SurfaceDom {
        transcript,
        input,
        send,
    })
}

fn element(document: &Document, tag: &str, class: &str) -> Result<HtmlElement, JsValue> {
    let element = document.create_element(tag)?.dyn_into::<HtmlElement>()?;
    element.set_class_name(class);
    Ok(element)
}

fn scroll_to_bottom(list: &HtmlElement) {
    list.set_scroll_top(list.scroll_height());
}

fn append_line(
    document: &Document,
    list: &HtmlElement,
    speaker: Speaker,
    text: &str,
) -> Option<HtmlElement> {
    let class = match speaker {
        Speaker::User => "ember-line ember-user",
        Speaker::Assistant => "ember-line ember-assistant",
    };
    let line = match element(document, "div", class) {
        Ok(line) => line,
        Err(error) => {
            tracing::warn!(?error, "failed to create transcript line");
            return None;
        }
    };
    line.set_text_content(Some(text));
    if let Err(error) = list.append_child(&line) {
        tracing::warn!(?error, "failed to append transcript line");
        return None;
    }
    scroll_to_bottom(list);
    Some(line)
}

pub struct DomPanel {
    pub panel: HtmlElement,
    pub bubble: HtmlElement,
    pub transcript: Option<HtmlElement>,
}

impl PanelView for DomPanel {
    fn set_open(&self, open: bool) {
        if let Err(error) = self.panel.class_list().toggle_with_force("ember-open", open) {
            tracing::warn!(?error, "failed to toggle panel");
        }
        let expanded = if open { "true" } else { "false" };
        if let Err(error) = self.bubble.set_attribute("aria-expanded", expanded) {
            tracing::debug!(?error, "failed to update aria-expanded");
        }
    }

    fn scroll_to_latest(&self) {
        if let Some(transcript) = &self.transcript {
            scroll_to_bottom(transcript);
        }
    }
}

/// Renders the host transcript into the inline surface.
pub struct DomTranscript {
    document: Document,
    list: HtmlElement,
    lines: RefCell<HashMap<EntryId, HtmlElement>>,
}

impl DomTranscript {
    pub fn new(document: Document, list: HtmlElement) -> Self {
        Self {
            document,
            list,
            lines: RefCell::new(HashMap::new()),
        }
    }
}

impl TranscriptObserver for DomTranscript {
    fn entry_appended(&self, entry: &TranscriptEntry) {
        let Some(line) = append_line(&self.document, &self.list, entry.speaker, &entry.text) else {
            return;
        };
        if entry.pending {
            let _ = line.class_list().add_1("ember-pending");
        }
        self.lines.borrow_mut().insert(entry.id, line);
    }

    fn entry_settled(&self, entry: &TranscriptEntry) {
        let Some(line) = self.lines.borrow().get(&entry.id).cloned() else {
            return;
        };
        line.set_text_content(Some(&entry.text));
        let _ = line.class_list().remove_1("ember-pending");
        scroll_to_bottom(&self.list);
    }
}

/// Lines a framed surface renders without the host transcript.
struct LocalLines {
    placeholder_text: String,
    pending: RefCell<Option<HtmlElement>>,
}

/// DOM side of a chat surface.
///
/// Inline surfaces share the host transcript; surfaces inside a nested frame keep their
/// own and render questions, answers and notices locally.
pub struct DomSurfaceView {
    document: Document,
    dom: SurfaceDom,
    local: Option<LocalLines>,
}

impl DomSurfaceView {
    pub fn inline(document: Document, dom: SurfaceDom) -> Self {
        Self {
            document,
            dom,
            local: None,
        }
    }

    pub fn framed(document: Document, dom: SurfaceDom, placeholder_text: String) -> Self {
        Self {
            document,
            dom,
            local: Some(LocalLines {
                placeholder_text,
                pending: RefCell::new(None),
            }),
        }
    }

    pub fn input(&self) -> &HtmlInputElement {
        &self.dom.input
    }

    pub fn send_button(&self) -> &HtmlElement {
        &self.dom.send
    }
}

impl SurfaceView for DomSurfaceView {
    fn focus_input(&self) {
        if let Err(error) = self.dom.input.focus() {
            tracing::debug!(?error, "failed to focus chat input");
        }
    }

    fn scroll_to_latest(&self) {
        scroll_to_bottom(&self.dom.transcript);
    }

    fn set_waiting(&self, waiting: bool) {
        self.dom.input.set_disabled(waiting);
        if !waiting {
            self.focus_input();
        }
    }

    fn question_sent(&self, text: &str) {
        self.dom.input.set_value("");
        let Some(local) = &self.local else {
            return;
        };

        append_line(&self.document, &self.dom.transcript, Speaker::User, text);
        let placeholder = append_line(
            &self.document,
            &self.dom.transcript,
            Speaker::Assistant,
            &local.placeholder_text,
        );
        if let Some(line) = &placeholder {
            let _ = line.class_list().add_1("ember-pending");
        }
        *local.pending.borrow_mut() = placeholder;
    }

    fn answer_received(&self, text: &str) {
        let Some(local) = &self.local else {
            return;
        };

        match local.pending.borrow_mut().take() {
            Some(line) => {
                line.set_text_content(Some(text));
                let _ = line.class_list().remove_1("ember-pending");
                scroll_to_bottom(&self.dom.transcript);
            }
            None => {
                append_line(&self.document, &self.dom.transcript, Speaker::Assistant, text);
            }
        }
    }

    fn notice_received(&self, text: &str) {
        if self.local.is_some() {
            append_line(&self.document, &self.dom.transcript, Speaker::Assistant, text);
        }
    }
}

/// Brief highlight on the bubble whenever the panel opens.
pub struct GlowDecorator {
    window: Window,
    bubble: HtmlElement,
}

impl GlowDecorator {
    pub fn new(window: Window, bubble: HtmlElement) -> Self {
        Self { window, bubble }
    }
}

impl OpenDecorator for GlowDecorator {
    fn on_open(&self) {
        if self.bubble.class_list().add_1("ember-glow").is_err() {
            return;
        }

        let bubble = self.bubble.clone();
        let fade = Closure::once_into_js(move || {
            let _ = bubble.class_list().remove_1("ember-glow");
        });
        if let Err(error) = self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(
                fade.unchecked_ref(),
                GLOW_MILLIS,
            )
        {
            tracing::debug!(?error, "failed to schedule glow fade");
        }
    }
}
