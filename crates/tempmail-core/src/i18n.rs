//! Translation table for user-facing text.
//!
//! Language only changes what the user reads; every locale drives the same
//! controller behavior.

/// Supported interface languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    /// English.
    #[default]
    English,
    /// Russian.
    Russian,
    /// Simplified Chinese.
    Chinese,
}

impl Locale {
    /// Picks a locale from a POSIX-style language tag (`ru_RU.UTF-8`, `zh-CN`, ...).
    ///
    /// Unknown tags fall back to English.
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        let lower = tag.to_lowercase();
        if lower.starts_with("ru") {
            Self::Russian
        } else if lower.starts_with("zh") {
            Self::Chinese
        } else {
            Self::English
        }
    }

    /// Returns the text for a key in this locale.
    #[must_use]
    pub const fn text(self, key: Text) -> &'static str {
        match self {
            Self::English => english(key),
            Self::Russian => russian(key),
            Self::Chinese => chinese(key),
        }
    }
}

/// Keys of every user-facing string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    /// A new address was generated.
    AddressCreated,
    /// Address generation failed (followed by the error).
    AddressFailed,
    /// Copy requested with no address.
    NoAddressToCopy,
    /// Address copied.
    AddressCopied,
    /// Copy failed (followed by the error).
    CopyFailed,
    /// Refresh requested without session or address.
    NoMailSession,
    /// Message list could not be fetched.
    FetchListFailed,
    /// Operation requested without a session.
    NoSession,
    /// The server rejected the session.
    SessionExpired,
    /// The session was reset on request.
    SessionReset,
    /// Message content could not be loaded.
    LoadMessageFailed,
    /// Attachment download started.
    DownloadingAttachment,
    /// Attachment saved.
    AttachmentSaved,
    /// Attachment download failed.
    AttachmentFailed,
    /// Delete confirmation prompt.
    ConfirmDelete,
    /// Message deleted.
    MessageDeleted,
    /// Delete failed.
    DeleteFailed,
    /// Auto-refresh interval rejected.
    InvalidInterval,
    /// Empty inbox placeholder.
    NoMessages,
    /// Placeholder for a missing subject.
    NoSubject,
    /// Placeholder for an empty body.
    NoBody,
    /// Sender label.
    From,
    /// Received-at label.
    Received,
    /// Attachments label.
    Attachments,
}

const fn english(key: Text) -> &'static str {
    match key {
        Text::AddressCreated => "New email address created!",
        Text::AddressFailed => "Failed to create a new email address",
        Text::NoAddressToCopy => "No email address to copy",
        Text::AddressCopied => "Email address copied to clipboard!",
        Text::CopyFailed => "Failed to copy email address",
        Text::NoMailSession => "No active email session",
        Text::FetchListFailed => "Failed to fetch emails",
        Text::NoSession => "No active session",
        Text::SessionExpired => "Session expired, generate a new address",
        Text::SessionReset => "Session cleared",
        Text::LoadMessageFailed => "Failed to load email content",
        Text::DownloadingAttachment => "Downloading attachment...",
        Text::AttachmentSaved => "Attachment downloaded successfully!",
        Text::AttachmentFailed => "Failed to download attachment",
        Text::ConfirmDelete => "Are you sure you want to delete this email?",
        Text::MessageDeleted => "Email deleted successfully!",
        Text::DeleteFailed => "Failed to delete email",
        Text::InvalidInterval => "Refresh interval must be between 1 and 86400 seconds",
        Text::NoMessages => "No emails",
        Text::NoSubject => "(No subject)",
        Text::NoBody => "This email has no content",
        Text::From => "From",
        Text::Received => "Received",
        Text::Attachments => "Attachments",
    }
}

const fn russian(key: Text) -> &'static str {
    match key {
        Text::AddressCreated => "Новый адрес электронной почты создан!",
        Text::AddressFailed => "Ошибка создания нового адреса электронной почты",
        Text::NoAddressToCopy => "Нет адреса электронной почты для копирования",
        Text::AddressCopied => "Адрес электронной почты скопирован в буфер обмена!",
        Text::CopyFailed => "Ошибка копирования адреса электронной почты",
        Text::NoMailSession => "Нет активной сессии электронной почты",
        Text::FetchListFailed => "Ошибка получения писем",
        Text::NoSession => "Нет активной сессии",
        Text::SessionExpired => "Сессия истекла, создайте новый адрес",
        Text::SessionReset => "Сессия сброшена",
        Text::LoadMessageFailed => "Ошибка загрузки содержимого письма",
        Text::DownloadingAttachment => "Загрузка вложения...",
        Text::AttachmentSaved => "Вложение успешно загружено!",
        Text::AttachmentFailed => "Ошибка загрузки вложения",
        Text::ConfirmDelete => "Вы уверены, что хотите удалить это письмо?",
        Text::MessageDeleted => "Письмо успешно удалено!",
        Text::DeleteFailed => "Ошибка удаления письма",
        Text::InvalidInterval => "Интервал обновления должен быть от 1 до 86400 секунд",
        Text::NoMessages => "Нет писем",
        Text::NoSubject => "(Без темы)",
        Text::NoBody => "Это письмо не содержит текста",
        Text::From => "Отправитель",
        Text::Received => "Время получения",
        Text::Attachments => "Вложения",
    }
}

const fn chinese(key: Text) -> &'static str {
    match key {
        Text::AddressCreated => "新邮箱地址已生成！",
        Text::AddressFailed => "生成新邮箱地址失败",
        Text::NoAddressToCopy => "没有邮箱地址可复制",
        Text::AddressCopied => "邮箱地址已复制到剪贴板！",
        Text::CopyFailed => "复制邮箱失败",
        Text::NoMailSession => "没有活动的邮箱会话",
        Text::FetchListFailed => "获取邮件失败",
        Text::NoSession => "没有活动会话",
        Text::SessionExpired => "会话已过期，请生成新地址",
        Text::SessionReset => "会话已清除",
        Text::LoadMessageFailed => "加载邮件内容失败",
        Text::DownloadingAttachment => "正在下载附件...",
        Text::AttachmentSaved => "附件下载成功！",
        Text::AttachmentFailed => "下载附件失败",
        Text::ConfirmDelete => "确定要删除这封邮件吗？",
        Text::MessageDeleted => "邮件删除成功！",
        Text::DeleteFailed => "删除邮件失败",
        Text::InvalidInterval => "刷新间隔必须在 1 到 86400 秒之间",
        Text::NoMessages => "暂无邮件",
        Text::NoSubject => "(无主题)",
        Text::NoBody => "此邮件没有内容",
        Text::From => "发件人",
        Text::Received => "接收时间",
        Text::Attachments => "附件",
    }
}
