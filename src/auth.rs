use anyhow::{Result, bail};
use std::io::{self, BufRead, IsTerminal};
use zeroize::Zeroizing;

pub const PASSWORD_ENV: &str = "KEYVAULT_PASSWORD";

/// Reads the master password.
///
/// Sources, in order: `KEYVAULT_PASSWORD`, one line of piped stdin, an
/// interactive prompt. With `confirm`, a prompted password must be typed
/// twice.
pub fn read_password(confirm: bool) -> Result<Zeroizing<String>> {
    //  KEYVAULT_PASSWORD="correct-horse" keyvault get example.com
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    //  echo "correct-horse" | keyvault get example.com
    if !io::stdin().is_terminal() {
        let mut buf = Zeroizing::new(String::new());
        io::stdin().lock().read_line(&mut buf)?;
        trim_newline(&mut buf);
        if buf.is_empty() {
            bail!("No password provided");
        }
        return Ok(buf);
    }

    let pw = Zeroizing::new(rpassword::prompt_password("Master password: ")?);
    if pw.is_empty() {
        bail!("password cannot be empty");
    }

    if confirm {
        let again = Zeroizing::new(rpassword::prompt_password("Confirm password: ")?);
        if *pw != *again {
            bail!("passwords do not match");
        }
    }

    Ok(pw)
}

fn trim_newline(s: &mut String) {
    while s.ends_with('\n') || s.ends_with('\r') {
        s.pop();
    }
}
