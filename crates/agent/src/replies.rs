use raterbot_core::domain::quote_request::{MandatoryField, QuoteParameters};

use crate::adapters::Reply;
use crate::guardrails::InputChannel;

pub fn acknowledgement(channel: InputChannel) -> Reply {
    match channel {
        InputChannel::Voice => Reply::plain("🤔 Analyzing..."),
        InputChannel::Text => Reply::plain("⚡ Processing..."),
    }
}

pub fn missing_field_prompt(field: MandatoryField) -> Reply {
    let question = match field {
        MandatoryField::Recipient => "Please **Type the Email Address**.".to_string(),
        other => format!("I am missing the **{}**.", other.field_name()),
    };
    Reply::markdown(format!("⚠️ {question}"))
}

pub fn confirmation_summary(parameters: &QuoteParameters) -> Reply {
    Reply::markdown(format!(
        "🎙 **Voice Detected. Please Review:**\n\
         • **Email:** {recipient}\n\
         • **Client:** {age} / {gender} / {state}\n\
         • **Amount:** ${face_amount}\n\
         • **Mode:** {mode}\n\
         • **Rating:** {rating}\n\
         • **Flat Extra:** {flat_extra}\n\
         \n\
         Type **'Yes'** to run.\n\
         Type **'Change X to Y'** to fix.",
        recipient = parameters.recipient,
        age = parameters.age,
        gender = parameters.gender,
        state = parameters.state,
        face_amount = parameters.face_amount,
        mode = parameters.mode,
        rating = parameters.table_rating,
        flat_extra = parameters.flat_extra,
    ))
}

pub fn running_quote(recipient: &str) -> Reply {
    Reply::plain(format!("🚀 Running quote for **{recipient}**..."))
}

pub fn quote_delivered(recipient: &str) -> Reply {
    Reply::plain(format!("✅ Done! Email sent to {recipient}."))
}

pub fn heard(transcript: &str) -> Reply {
    Reply::plain(format!("🗣 I heard: \"{transcript}\""))
}
