//! Server-rendered pages: the landing page and the payment confirmation.

use crate::domain::payment::Currency;
use html_escape::{encode_double_quoted_attribute, encode_text};
use rust_decimal::Decimal;

pub struct IndexView<'a> {
    pub publishable_key: Option<&'a str>,
    pub price: Decimal,
    pub currency: Currency,
}

impl IndexView<'_> {
    pub fn render(&self) -> String {
        let key = self.publishable_key.unwrap_or_default();
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>CareerLens</title></head>
<body data-intasend-key="{key}">
  <h1>Why does it matter?</h1>
  <form id="topic-form"><input name="topic" placeholder="Enter a topic"><button>Explain</button></form>
  <section id="premium">
    <p>Unlock premium access for {currency} {price}</p>
    <form id="payment-form">
      <input name="email" type="email" placeholder="Email">
      <input name="phone" placeholder="Phone number">
      <button>Pay with M-PESA</button>
    </form>
  </section>
</body>
</html>
"#,
            key = encode_double_quoted_attribute(key),
            currency = self.currency.as_str(),
            price = self.price.normalize(),
        )
    }
}

pub struct SuccessView<'a> {
    pub transaction_id: Option<&'a str>,
    pub amount: Option<&'a str>,
}

impl SuccessView<'_> {
    pub fn render(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Payment received</title></head>
<body>
  <h1>Thank you!</h1>
  <p>Transaction: <span id="transaction-id">{transaction_id}</span></p>
  <p>Amount: <span id="amount">{amount}</span></p>
  <a href="/">Back to CareerLens</a>
</body>
</html>
"#,
            transaction_id = encode_text(self.transaction_id.unwrap_or("unknown")),
            amount = encode_text(self.amount.unwrap_or("-")),
        )
    }
}
