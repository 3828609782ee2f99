//! 対話入力
//!
//! 現在の値をデフォルトとして表示し、空入力ならそのまま使う。

use colored::Colorize;
use nmstack_core::{InventoryDatabase, StackConfig};
use std::fmt::Display;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;

pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl Prompter<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// 1行入力（空入力・EOF ならデフォルト）
    pub fn ask(&mut self, question: &str, default: &str) -> io::Result<String> {
        if default.is_empty() {
            write!(self.output, "{}: ", question)?;
        } else {
            write!(self.output, "{} [{}]: ", question, default.dimmed())?;
        }
        self.output.flush()?;

        let mut input = String::new();
        self.input.read_line(&mut input)?;
        let answer = input.trim();
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer.to_string()
        })
    }

    /// 解析できる値が入力されるまで繰り返す
    pub fn ask_parsed<T>(&mut self, question: &str, default: T) -> io::Result<T>
    where
        T: FromStr + Display,
        T::Err: Display,
    {
        let default_text = default.to_string();
        loop {
            let answer = self.ask(question, &default_text)?;
            if answer == default_text {
                return Ok(default);
            }
            match answer.parse() {
                Ok(value) => return Ok(value),
                Err(e) => writeln!(self.output, "  {} {}", "✗".red(), e)?,
            }
        }
    }

    /// y/n の確認
    pub fn confirm(&mut self, question: &str, default: bool) -> io::Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        let answer = self.ask(&format!("{} ({})", question, hint), "")?;
        Ok(match answer.to_lowercase().as_str() {
            "y" | "yes" => true,
            "n" | "no" => false,
            _ => default,
        })
    }

    /// スタック設定を対話的に埋める
    pub fn fill(&mut self, config: &mut StackConfig) -> io::Result<()> {
        writeln!(self.output, "{}", "nmstack の設定 (Enter でデフォルト値)".bold())?;

        config.base_dir = PathBuf::from(
            self.ask("ベースディレクトリ", &config.base_dir.display().to_string())?,
        );
        config.timezone = self.ask("タイムゾーン", &config.timezone)?;
        config.monitor_interface =
            self.ask("監視用ネットワークインターフェース", &config.monitor_interface)?;
        config.inventory_database = self.ask_parsed::<InventoryDatabase>(
            "NetBox のデータベース (postgres / mariadb / shared)",
            config.inventory_database,
        )?;
        config.netbox.admin_email = self.ask("NetBox 管理者メールアドレス", &config.netbox.admin_email)?;

        if self.confirm("通知メール (SMTP) を設定しますか", config.smtp.enabled())? {
            config.smtp.host = self.ask("SMTP サーバー", &config.smtp.host)?;
            config.smtp.port = self.ask_parsed("SMTP ポート", config.smtp.port)?;
            config.smtp.username = self.ask("SMTP ユーザー (認証なしなら空)", &config.smtp.username)?;
            if !config.smtp.username.is_empty() {
                config.smtp.password = self.ask("SMTP パスワード", &config.smtp.password)?;
            }
            config.smtp.from = self.ask("送信元アドレス", &config.smtp.from)?;
        } else {
            config.smtp.host.clear();
        }

        Ok(())
    }
}
