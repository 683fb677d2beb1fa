use crate::application::ports::email_port::EmailMessage;

/// Single-recipient message with a call-to-action button.
pub fn button_email(
    email: &str,
    subject: &str,
    hint: &str,
    button_text: &str,
    button_link: &str,
    ignore_text: &str,
) -> EmailMessage {
    let html = format!(
        concat!(
            r#"<h2 style="font-family: Arial, sans-serif;">{subject}</h2>"#,
            r#"<p style="font-family: Arial, sans-serif;">{hint}</p>"#,
            "<p>",
            r#"<a href="{link}" "#,
            r#"style="display: inline-block; padding: 10px 20px; font-family: Arial, sans-serif; "#,
            "font-size: 16px; color: #ffffff; background-color: #52528C; text-decoration: none; ",
            r#"border-radius: 5px;">"#,
            "{button}",
            "</a>",
            "</p>",
            r#"<p style="font-family: Arial, sans-serif; font-size: 12px; color: #6c757d;"><i>{ignore}</i></p>"#,
        ),
        subject = subject,
        hint = hint,
        link = button_link.replace('"', "%22"),
        button = button_text,
        ignore = ignore_text,
    );
    EmailMessage {
        to: vec![email.to_string()],
        subject: subject.to_string(),
        html,
    }
}

pub fn magic_link(email: &str, link: &str, expires_minutes: i64) -> EmailMessage {
    button_email(
        email,
        "Your magic link",
        "Click the button below to login:",
        "Login",
        link,
        &format!("This link will expire in {expires_minutes} minutes."),
    )
}

pub fn signup_confirmation(email: &str, confirm_link: &str) -> EmailMessage {
    button_email(
        email,
        "Confirm your signup",
        "Please confirm your email address by clicking the button below:",
        "Confirm your email",
        confirm_link,
        "If you did not sign up for this account, you can ignore this email.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magic_link_embeds_the_link_and_expiry() {
        let link = "https://api.example.com/login/code?code=abc";
        let msg = magic_link("user@example.com", link, 5);
        assert_eq!(msg.to, vec!["user@example.com".to_string()]);
        assert_eq!(msg.subject, "Your magic link");
        assert!(msg.html.contains(&format!(r#"href="{link}""#)));
        assert!(msg.html.contains("expire in 5 minutes"));
    }

    #[test]
    fn quotes_in_links_cannot_break_the_attribute() {
        let msg = magic_link("user@example.com", "https://x.test/?a=\"b\"", 5);
        assert!(msg.html.contains("https://x.test/?a=%22b%22"));
    }

    #[test]
    fn signup_confirmation_uses_its_own_wording() {
        let msg = signup_confirmation("user@example.com", "https://app.example.com/confirm");
        assert_eq!(msg.subject, "Confirm your signup");
        assert!(msg.html.contains("Confirm your email</a>"));
    }
}
