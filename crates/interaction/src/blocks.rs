use parley_core::schema::{FormField, InputStyle};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    Plain { text: String },
    Markdown { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self::Markdown { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Plain { text } | Self::Markdown { text } => text,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ButtonElement {
    pub custom_id: String,
    pub label: TextObject,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<ButtonStyle>,
}

impl ButtonElement {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self { custom_id: custom_id.into(), label: TextObject::plain(label), style: None }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = Some(style);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: TextObject,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectMenuElement {
    pub custom_id: String,
    pub placeholder: TextObject,
    pub options: Vec<SelectOption>,
    pub min_values: usize,
    pub max_values: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Section { block_id: String, text: TextObject },
    Actions { block_id: String, elements: Vec<ButtonElement> },
    Select { block_id: String, menu: SelectMenuElement },
    Context { block_id: String, elements: Vec<TextObject> },
}

impl Block {
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Actions { .. } | Self::Select { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    pub fallback_text: String,
    pub blocks: Vec<Block>,
}

impl MessageTemplate {
    /// The same message with every button row and select menu removed, used
    /// when a dialogue closes so stale components cannot be pressed.
    pub fn without_components(mut self) -> Self {
        self.blocks.retain(|block| !block.is_interactive());
        self
    }

    pub fn custom_ids(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .flat_map(|block| match block {
                Block::Actions { elements, .. } => {
                    elements.iter().map(|element| element.custom_id.as_str()).collect()
                }
                Block::Select { menu, .. } => vec![menu.custom_id.as_str()],
                _ => Vec::new(),
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextInputElement {
    pub custom_id: String,
    pub label: String,
    pub style: InputStyle,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

impl From<&FormField> for TextInputElement {
    fn from(field: &FormField) -> Self {
        Self {
            custom_id: field.id.clone(),
            label: field.label.clone(),
            style: field.style,
            required: field.required,
            placeholder: field.placeholder.clone(),
            max_length: field.max_length,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FormTemplate {
    pub custom_id: String,
    pub title: String,
    pub inputs: Vec<TextInputElement>,
}

impl FormTemplate {
    pub fn new(
        custom_id: impl Into<String>,
        title: impl Into<String>,
        fields: &[FormField],
    ) -> Self {
        Self {
            custom_id: custom_id.into(),
            title: title.into(),
            inputs: fields.iter().map(TextInputElement::from).collect(),
        }
    }
}

pub struct MessageBuilder {
    fallback_text: String,
    blocks: Vec<Block>,
}

impl MessageBuilder {
    pub fn new(fallback_text: impl Into<String>) -> Self {
        Self { fallback_text: fallback_text.into(), blocks: Vec::new() }
    }

    pub fn section<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut SectionBuilder),
    {
        let mut builder = SectionBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Section { block_id: block_id.into(), text: builder.build() });
        self
    }

    pub fn actions<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ActionsBuilder),
    {
        let mut builder = ActionsBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Actions { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn select(mut self, block_id: impl Into<String>, menu: SelectMenuElement) -> Self {
        self.blocks.push(Block::Select { block_id: block_id.into(), menu });
        self
    }

    pub fn context<F>(mut self, block_id: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut ContextBuilder),
    {
        let mut builder = ContextBuilder::default();
        build(&mut builder);
        self.blocks.push(Block::Context { block_id: block_id.into(), elements: builder.build() });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { fallback_text: self.fallback_text, blocks: self.blocks }
    }
}

#[derive(Default)]
pub struct SectionBuilder {
    text: Option<TextObject>,
}

impl SectionBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::plain(text));
        self
    }

    pub fn markdown(&mut self, text: impl Into<String>) -> &mut Self {
        self.text = Some(TextObject::markdown(text));
        self
    }

    fn build(self) -> TextObject {
        self.text.unwrap_or_else(|| TextObject::plain(""))
    }
}

#[derive(Default)]
pub struct ActionsBuilder {
    elements: Vec<ButtonElement>,
}

impl ActionsBuilder {
    pub fn button(&mut self, button: ButtonElement) -> &mut Self {
        self.elements.push(button);
        self
    }

    fn build(self) -> Vec<ButtonElement> {
        self.elements
    }
}

#[derive(Default)]
pub struct ContextBuilder {
    elements: Vec<TextObject>,
}

impl ContextBuilder {
    pub fn plain(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::plain(text));
        self
    }

    pub fn markdown(&mut self, text: impl Into<String>) -> &mut Self {
        self.elements.push(TextObject::markdown(text));
        self
    }

    fn build(self) -> Vec<TextObject> {
        self.elements
    }
}

pub fn notice_message(summary: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("dialogue.notice.v1", |section| {
            section.plain(summary);
        })
        .build()
}

pub fn error_message(summary: &str, correlation_id: &str) -> MessageTemplate {
    MessageBuilder::new(summary.to_owned())
        .section("dialogue.error.summary.v1", |section| {
            section.markdown(format!(":warning: {summary}"));
        })
        .context("dialogue.error.context.v1", |context| {
            context.plain(format!("Correlation ID: {correlation_id}"));
        })
        .build()
}

/// Bridge shown when a form has to follow another form submission.
pub fn continue_message(custom_id: &str, title: &str) -> MessageTemplate {
    MessageBuilder::new(format!("Continue to {title}"))
        .section("dialogue.bridge.summary.v1", |section| {
            section.markdown(format!("*{title}*\nPress continue to open the next step."));
        })
        .actions("dialogue.bridge.actions.v1", |actions| {
            actions.button(ButtonElement::new(custom_id, "Continue").style(ButtonStyle::Primary));
        })
        .build()
}

#[cfg(test)]
mod tests {
    use parley_core::schema::{FormField, InputStyle};

    use super::{
        continue_message, error_message, Block, ButtonElement, ButtonStyle, FormTemplate,
        MessageBuilder, SelectMenuElement, SelectOption, TextObject,
    };

    #[test]
    fn message_builder_creates_typed_block_structure() {
        let message = MessageBuilder::new("fallback")
            .section("econ.confirm.summary.v1", |section| {
                section.markdown("*Confirm transfer*");
            })
            .actions("econ.confirm.actions.v1", |actions| {
                actions.button(ButtonElement::new("econ/True@n1", "Yes"));
            })
            .build();

        assert_eq!(message.blocks.len(), 2);
        assert!(matches!(
            &message.blocks[0],
            Block::Section {
                block_id,
                text: TextObject::Markdown { .. }
            } if block_id == "econ.confirm.summary.v1"
        ));
        assert!(matches!(
            &message.blocks[1],
            Block::Actions { block_id, elements }
                if block_id == "econ.confirm.actions.v1" && elements.len() == 1
        ));
    }

    #[test]
    fn without_components_strips_buttons_and_menus() {
        let message = MessageBuilder::new("fallback")
            .section("s", |section| {
                section.plain("question");
            })
            .actions("a", |actions| {
                actions.button(ButtonElement::new("ns/True@1", "Yes").style(ButtonStyle::Success));
            })
            .select(
                "m",
                SelectMenuElement {
                    custom_id: "ns/Select@1".to_owned(),
                    placeholder: TextObject::plain("Pick"),
                    options: vec![SelectOption {
                        value: "r1".to_owned(),
                        label: TextObject::plain("Role"),
                    }],
                    min_values: 1,
                    max_values: 1,
                },
            )
            .build();

        assert_eq!(message.custom_ids(), vec!["ns/True@1", "ns/Select@1"]);
        let closed = message.without_components();
        assert_eq!(closed.blocks.len(), 1);
        assert!(closed.custom_ids().is_empty());
    }

    #[test]
    fn form_template_mirrors_field_schema() {
        let form = FormTemplate::new(
            "econ/Form@1",
            "Group balance",
            &[
                FormField::short("Targets", "Users").placeholder("@user or nick"),
                FormField::paragraph("Reason", "Reason").optional(),
            ],
        );

        assert_eq!(form.inputs.len(), 2);
        assert!(form.inputs[0].required);
        assert_eq!(form.inputs[0].placeholder.as_deref(), Some("@user or nick"));
        assert_eq!(form.inputs[1].style, InputStyle::Paragraph);
        assert!(!form.inputs[1].required);
    }

    #[test]
    fn error_template_contains_correlation_id() {
        let message = error_message("Cannot process request", "req-123");
        let elements = if let Block::Context { elements, .. } = &message.blocks[1] {
            Some(elements)
        } else {
            None
        };
        assert!(elements.is_some(), "expected context block");
        let elements = elements.expect("context block asserted above");
        assert!(matches!(
            elements.first(),
            Some(TextObject::Plain { text }) if text.contains("req-123")
        ));
    }

    #[test]
    fn continue_bridge_serializes_with_button_custom_id() {
        let message = continue_message("econ/Continue@abc", "Step two");
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(json["blocks"][1]["type"], "actions");
        assert_eq!(json["blocks"][1]["elements"][0]["custom_id"], "econ/Continue@abc");
        assert_eq!(json["blocks"][1]["elements"][0]["style"], "primary");
    }
}
