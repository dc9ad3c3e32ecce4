//! Message rendering for each notification and channel.

use std::fmt::Write as _;

use common::OrderStatus;
use store::{Order, User};

use crate::channels::{ChannelKind, OutboundMessage};
use crate::notification::Notification;

const BRAND: &str = "Storefront";

/// Renders notifications into channel-specific messages.
#[derive(Debug, Clone)]
pub struct Templates {
    frontend_url: String,
}

impl Templates {
    pub fn new(frontend_url: impl Into<String>) -> Self {
        let frontend_url = frontend_url.into();
        Self {
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn render(&self, notification: &Notification, channel: ChannelKind) -> OutboundMessage {
        match notification {
            Notification::Welcome { user } => self.welcome(user, channel),
            Notification::OrderConfirmation { order, user } => {
                self.order_confirmation(order, user, channel)
            }
            Notification::StatusUpdate {
                order,
                user,
                status,
            } => self.status_update(order, user, *status, channel),
        }
    }

    /// A short message confirming that a channel reaches the user.
    pub fn render_test(&self, user: &User, channel: ChannelKind) -> OutboundMessage {
        let subject = format!("{BRAND} test notification");
        let body = match channel {
            ChannelKind::Email => format!(
                "<h1>Test notification</h1>\
                 <p>Hi {name},</p>\
                 <p>This is a test message from {BRAND}. Email notifications are working.</p>",
                name = escape_html(&user.name),
            ),
            ChannelKind::Sms => format!(
                "Hi {}, this is a test message from {BRAND}. SMS notifications are working.",
                user.name
            ),
            ChannelKind::WhatsApp => format!(
                "*{BRAND}*\n\nHi {}, this is a test message. WhatsApp notifications are working.",
                user.name
            ),
        };
        OutboundMessage { subject, body }
    }

    fn tracking_link(&self, order: &Order) -> String {
        format!("{}/orders/{}", self.frontend_url, order.id)
    }

    fn welcome(&self, user: &User, channel: ChannelKind) -> OutboundMessage {
        let subject = format!("Welcome to {BRAND}!");
        let body = match channel {
            ChannelKind::Email => format!(
                "<h1>Welcome to {BRAND}!</h1>\
                 <p>Hi {name},</p>\
                 <p>Your account has been created. Browse our products, fill your cart \
                 and track every delivery from your account.</p>\
                 <p><a href=\"{url}\">Start shopping</a></p>\
                 <p>This email was sent to {email}</p>",
                name = escape_html(&user.name),
                url = self.frontend_url,
                email = escape_html(&user.email),
            ),
            ChannelKind::Sms => format!(
                "Welcome to {BRAND}, {}! Your account is ready. Start shopping: {}",
                user.name, self.frontend_url
            ),
            ChannelKind::WhatsApp => format!(
                "Welcome to *{BRAND}*, {}!\n\nYour account is ready.\n\nStart shopping: {}",
                user.name, self.frontend_url
            ),
        };
        OutboundMessage { subject, body }
    }

    fn order_confirmation(&self, order: &Order, user: &User, channel: ChannelKind) -> OutboundMessage {
        let subject = format!("Order Confirmed - {}", order.order_number);
        let link = self.tracking_link(order);
        let body = match channel {
            ChannelKind::Email => {
                let mut items = String::new();
                for line in &order.lines {
                    let _ = write!(
                        items,
                        "<li>{} x {} - ₹{}</li>",
                        escape_html(&line.product_name),
                        line.quantity,
                        line.subtotal
                    );
                }
                format!(
                    "<h1>Order Confirmed</h1>\
                     <p>Hi {name},</p>\
                     <p>We have received your order and are preparing it for delivery.</p>\
                     <p><strong>Order Number:</strong> {number}<br>\
                     <strong>Order Date:</strong> {date}<br>\
                     <strong>Payment Method:</strong> {method}<br>\
                     <strong>Payment Status:</strong> {payment}</p>\
                     <ul>{items}</ul>\
                     <p><strong>Subtotal:</strong> ₹{subtotal}<br>\
                     <strong>Delivery Charge:</strong> ₹{delivery}<br>\
                     <strong>Total:</strong> ₹{total}</p>\
                     <p><strong>Delivery Address:</strong> {address}</p>\
                     <p><a href=\"{link}\">Track order</a></p>",
                    name = escape_html(&user.name),
                    number = order.order_number,
                    date = order.created_at.format("%Y-%m-%d %H:%M UTC"),
                    method = escape_html(&order.payment_method),
                    payment = order.payment_status,
                    subtotal = order.lines_subtotal(),
                    delivery = order.delivery_charge,
                    total = order.total_amount,
                    address = escape_html(&order.delivery_address),
                )
            }
            ChannelKind::Sms => format!(
                "Hi {},\n\nYour order {} has been confirmed! Total: ₹{}.\n\nTrack: {}\n\n- {BRAND}",
                user.name, order.order_number, order.total_amount, link
            ),
            ChannelKind::WhatsApp => {
                let items = order
                    .lines
                    .iter()
                    .map(|line| {
                        format!(
                            "• {} x{} - ₹{}",
                            line.product_name, line.quantity, line.subtotal
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "*Order Confirmed!*\n\nHi {},\n\nOrder: *{}*\n\n{}\n\nTotal: *₹{}*\nDelivery to: {}\n\nTrack your order: {}",
                    user.name,
                    order.order_number,
                    items,
                    order.total_amount,
                    order.delivery_address,
                    link
                )
            }
        };
        OutboundMessage { subject, body }
    }

    fn status_update(
        &self,
        order: &Order,
        user: &User,
        status: OrderStatus,
        channel: ChannelKind,
    ) -> OutboundMessage {
        let subject = format!("Order Update - {}", order.order_number);
        let link = self.tracking_link(order);
        let headline = status_headline(status);
        let body = match channel {
            ChannelKind::Email => {
                let mut extra = String::new();
                match status {
                    OrderStatus::Delivered => {
                        extra.push_str("<p>We hope you enjoy your purchase!</p>");
                    }
                    OrderStatus::InTransit => {
                        if let Some(phone) = user.contact_phone() {
                            let _ = write!(
                                extra,
                                "<p>Your delivery agent will contact you shortly at {}.</p>",
                                escape_html(phone)
                            );
                        }
                    }
                    _ => {}
                }
                format!(
                    "<h1>Order Update</h1>\
                     <p>Hi {name},</p>\
                     <h3>{headline}</h3>\
                     <p><strong>Order Number:</strong> {number}<br>\
                     <strong>Status:</strong> {upper}</p>\
                     {extra}\
                     <p><a href=\"{link}\">View order details</a></p>",
                    name = escape_html(&user.name),
                    number = order.order_number,
                    upper = status.as_str().to_uppercase(),
                )
            }
            ChannelKind::Sms => format!(
                "Hi {}, {} ({}).\n\nTrack: {}\n\n- {BRAND}",
                user.name,
                headline.to_lowercase(),
                order.order_number,
                link
            ),
            ChannelKind::WhatsApp => {
                let mut text = format!(
                    "*Order Update*\n\nHi {},\n\n{}\n\nOrder: *{}*\nStatus: *{}*",
                    user.name,
                    headline,
                    order.order_number,
                    status.as_str().to_uppercase()
                );
                match status {
                    OrderStatus::Delivered => {
                        text.push_str("\n\nThank you for shopping with us!");
                    }
                    OrderStatus::InTransit => {
                        text.push_str("\n\nOur delivery agent will contact you shortly.");
                    }
                    _ => {}
                }
                let _ = write!(text, "\n\nView details: {link}");
                text
            }
        };
        OutboundMessage { subject, body }
    }
}

fn status_headline(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Your order has been received",
        OrderStatus::Processing => "Your order is being processed",
        OrderStatus::InTransit => "Your order is out for delivery",
        OrderStatus::Delivered => "Your order has been delivered",
        OrderStatus::Cancelled => "Your order has been cancelled",
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
