use crate::asm::emit::{render_hex, render_map};
use crate::asm::*;

fn assemble(source: &str) -> Assembly {
    assemble_str(source, "test.s").unwrap()
}

fn image(source: &str) -> Vec<u8> {
    assemble(source).program_image().unwrap().1
}

mod symbols {
    use super::*;

    #[test]
    fn assignment_chains_reach_a_fix_point() {
        // A depends on B, declared before B exists.
        let bytes = image("A = B + 1\nB = 2\nlda #A");
        assert_eq!(bytes, vec![0xa9, 0x03]);
    }

    #[test]
    fn labels_resolve_forward() {
        let assembly = assemble(
            ".org $0200\n\
             jmp target\n\
             target:\n\
             nop",
        );
        let (origin, bytes) = assembly.program_image().unwrap();
        assert_eq!(origin, 0x0200);
        assert_eq!(bytes, vec![0x4c, 0x03, 0x02, 0xea]);
    }

    #[test]
    fn unresolved_symbols_fail_with_their_declaration_site() {
        let err = assemble_str("A = B + 1\nlda #A", "test.s").unwrap_err();
        match err {
            AsmError::Unresolved { name, line, .. } => {
                assert_eq!(name, "A");
                assert_eq!(line, 1);
            }
            other => panic!("expected Unresolved, got {:?}", other),
        }
    }

    #[test]
    fn definition_cycles_fail_rather_than_hang() {
        let err = assemble_str("A = B\nB = A\nlda #A", "test.s").unwrap_err();
        assert!(matches!(err, AsmError::Unresolved { .. }));
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        assert!(assemble_str("A = 1\nA = 2", "test.s").is_err());
        assert!(assemble_str("loop:\nloop:", "test.s").is_err());
    }

    #[test]
    fn star_is_the_current_instruction_address_in_operands() {
        let bytes = image(".org $0200\nnop\njmp *");
        assert_eq!(bytes, vec![0xea, 0x4c, 0x01, 0x02]);
    }
}

mod addressing {
    use super::*;

    #[test]
    fn byte_operands_pick_zero_page() {
        assert_eq!(image("lda $10"), vec![0xa5, 0x10]);
        assert_eq!(image("lda $10,x"), vec![0xb5, 0x10]);
        assert_eq!(image("ldx $10,y"), vec![0xb6, 0x10]);
    }

    #[test]
    fn word_operands_pick_absolute() {
        assert_eq!(image("lda $1234"), vec![0xad, 0x34, 0x12]);
        assert_eq!(image("lda $1234,x"), vec![0xbd, 0x34, 0x12]);
        assert_eq!(image("lda $1234,y"), vec![0xb9, 0x34, 0x12]);
    }

    #[test]
    fn four_digit_literals_stay_words() {
        // $0010 is syntactically a word even though the value fits a byte.
        assert_eq!(image("lda $0010"), vec![0xad, 0x10, 0x00]);
    }

    #[test]
    fn byte_operand_without_a_zero_page_form_promotes() {
        // JMP has no zero-page encoding; the byte operand widens.
        assert_eq!(image("jmp $10"), vec![0x4c, 0x10, 0x00]);
    }

    #[test]
    fn indirect_forms() {
        assert_eq!(image("jmp ($1234)"), vec![0x6c, 0x34, 0x12]);
        assert_eq!(image("lda ($10,x)"), vec![0xa1, 0x10]);
        assert_eq!(image("lda ($10),y"), vec![0xb1, 0x10]);
    }

    #[test]
    fn accumulator_and_implied_swap_when_needed() {
        // `asl` written with no operand is accumulator mode.
        assert_eq!(image("asl"), vec![0x0a]);
        assert_eq!(image("asl a"), vec![0x0a]);
        assert_eq!(image("nop"), vec![0xea]);
    }

    #[test]
    fn immediate_rejects_word_operands() {
        let err = assemble_str("lda #$1234", "test.s").unwrap_err();
        assert!(matches!(err, AsmError::Width { .. }));
    }

    #[test]
    fn illegal_mode_is_reported() {
        // There is no (zp),Y form of CPX.
        let err = assemble_str("cpx ($10),y", "test.s").unwrap_err();
        assert!(matches!(err, AsmError::IllegalMode { .. }));
    }
}

mod branches {
    use super::*;

    #[test]
    fn backward_branch_encodes_a_negative_displacement() {
        let bytes = image(
            ".org $0200\n\
             loop:\n\
             nop\n\
             bcc loop",
        );
        // bcc at $0201; effective address $0203; target $0200 -> -3.
        assert_eq!(bytes, vec![0xea, 0x90, 0xfd]);
    }

    #[test]
    fn forward_branch_encodes_a_positive_displacement() {
        let bytes = image(
            ".org $0200\n\
             beq skip\n\
             nop\n\
             skip:\n\
             nop",
        );
        assert_eq!(bytes, vec![0xf0, 0x01, 0xea, 0xea]);
    }

    #[test]
    fn displacement_round_trips_through_the_cpu_rule() {
        // Encoding delta then decoding relative to the post-instruction IP
        // reproduces the target, for a spread of in-range deltas.
        for delta in [-128i32, -17, -1, 0, 1, 17, 127] {
            let offset = 0x0280u16;
            let effective = offset.wrapping_add(2);
            let target = (effective as i32 + delta) as u16;
            let encoded = (delta as i8) as u8;
            let decoded = effective.wrapping_add(encoded as i8 as i16 as u16);
            assert_eq!(decoded, target);
        }
    }

    #[test]
    fn out_of_range_branches_fail() {
        let err = assemble_str(
            ".org $0200\n\
             loop:\n\
             bcc far\n\
             .org $0400\n\
             far:\n\
             nop",
            "test.s",
        )
        .unwrap_err();
        assert!(matches!(err, AsmError::BranchOutOfRange { .. }));
    }
}

mod data {
    use super::*;

    #[test]
    fn data_items_take_their_natural_width() {
        assert_eq!(image(".data $01"), vec![0x01]);
        assert_eq!(image(".data $1234"), vec![0x34, 0x12]);
        assert_eq!(image(".data 1, 2, 3"), vec![1, 2, 3]);
    }

    #[test]
    fn byte_and_word_directives_force_width() {
        assert_eq!(image(".word $12"), vec![0x12, 0x00]);
        assert_eq!(image(".byte $12"), vec![0x12]);
        let err = assemble_str(".byte $1234", "test.s").unwrap_err();
        assert!(matches!(err, AsmError::Width { .. }));
    }

    #[test]
    fn labels_in_data_are_word_sized() {
        let bytes = image(
            ".org $0200\n\
             vector:\n\
             nop\n\
             .data vector",
        );
        assert_eq!(bytes, vec![0xea, 0x00, 0x02]);
    }
}

mod layout {
    use super::*;

    #[test]
    fn org_moves_the_cursor_and_gaps_fill_with_nop() {
        let (origin, bytes) = assemble(
            ".org $0200\n\
             lda #$01\n\
             .org $0208\n\
             lda #$02",
        )
        .program_image()
        .unwrap();
        assert_eq!(origin, 0x0200);
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[0..2], &[0xa9, 0x01]);
        assert!(bytes[2..8].iter().all(|b| *b == GAP_FILL_BYTE));
        assert_eq!(&bytes[8..10], &[0xa9, 0x02]);
    }

    #[test]
    fn star_assignment_is_an_origin() {
        let (origin, _) = assemble("* = $c000\nnop").program_image().unwrap();
        assert_eq!(origin, 0xc000);
    }

    #[test]
    fn backwards_org_overlap_is_an_error() {
        let result = assemble_str(
            ".org $0200\n\
             lda #$01\n\
             .org $0200\n\
             lda #$02",
            "test.s",
        )
        .unwrap()
        .program_image();
        assert!(matches!(result, Err(AsmError::Overlap { .. })));
    }
}

mod artefacts {
    use super::*;

    fn parse_hex(hex: &str) -> Vec<(u16, Vec<u8>)> {
        let mut records = Vec::new();
        for line in hex.lines() {
            let line = line.strip_prefix(':').expect("records start with ':'");
            let bytes: Vec<u8> = (0..line.len() / 2)
                .map(|i| u8::from_str_radix(&line[i * 2..i * 2 + 2], 16).unwrap())
                .collect();
            let len = bytes[0] as usize;
            let addr = (bytes[1] as u16) << 8 | bytes[2] as u16;
            let record_type = bytes[3];

            // Record checksum: the byte sum including CC is 0 mod 256.
            let sum: u32 = bytes.iter().map(|b| *b as u32).sum();
            assert_eq!(sum % 256, 0, "bad checksum in record {}", line);

            if record_type == 0x01 {
                break;
            }
            assert_eq!(record_type, 0x00);
            assert_eq!(bytes.len(), len + 5);
            records.push((addr, bytes[4..4 + len].to_vec()));
        }
        records
    }

    #[test]
    fn hex_records_checksum_and_terminate() {
        let assembly = assemble(
            ".org $0200\n\
             lda #$01\n\
             sta $0200",
        );
        let hex = render_hex(&assembly);
        assert!(hex.ends_with(":00000001FF\n"));
        let records = parse_hex(&hex);
        assert_eq!(records[0].0, 0x0200);
    }

    #[test]
    fn hex_agrees_with_the_binary_image() {
        let assembly = assemble(
            ".org $0200\n\
             start:\n\
             lda #$01\n\
             sta $00\n\
             sta $01\n\
             ldx #$20\n\
             loop:\n\
             clc\n\
             adc $01\n\
             dex\n\
             bne loop\n\
             jmp start\n\
             .data $de, $ad, $be, $ef\n\
             .word start",
        );
        let (origin, bytes) = assembly.program_image().unwrap();

        let mut rebuilt = vec![GAP_FILL_BYTE; bytes.len()];
        for (addr, data) in parse_hex(&render_hex(&assembly)) {
            let start = (addr - origin) as usize;
            rebuilt[start..start + data.len()].copy_from_slice(&data);
        }
        assert_eq!(rebuilt, bytes);
    }

    #[test]
    fn long_runs_split_into_sixteen_byte_records() {
        let data = (0..40)
            .map(|i| format!("${:02x}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let assembly = assemble(&format!(".org $0300\n.byte {}", data));
        let records = parse_hex(&render_hex(&assembly));
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].1.len(), 16);
        assert_eq!(records[1].0, 0x0310);
        assert_eq!(records[2].1.len(), 8);
    }

    #[test]
    fn map_lists_symbols_and_disassembly() {
        let assembly = assemble(
            "COUNT = $20\n\
             .org $0200\n\
             start:\n\
             lda #COUNT\n\
             sta $0200",
        );
        let map = render_map(&assembly);
        assert!(map.contains("Symbol Table:"));
        assert!(map.contains("COUNT"));
        assert!(map.contains("$20"));
        assert!(map.contains("start"));
        assert!(map.contains("$0200"));
        assert!(map.contains("lda #$20"));
        assert!(map.contains("sta $0200"));
    }

    #[test]
    fn fibonacci_assembles_to_the_expected_encoding() {
        let assembly = assemble(
            ".org $0200\n\
             lda #$01\n\
             sta $00\n\
             sta $01\n\
             loop:\n\
             clc\n\
             lda $00\n\
             adc $01\n\
             sta $02\n\
             lda $01\n\
             sta $00\n\
             lda $02\n\
             sta $01\n\
             bcc loop",
        );
        let (origin, bytes) = assembly.program_image().unwrap();
        assert_eq!(origin, 0x0200);
        assert_eq!(
            bytes,
            vec![
                0xa9, 0x01, // lda #$01
                0x85, 0x00, // sta $00
                0x85, 0x01, // sta $01
                0x18, // clc
                0xa5, 0x00, // lda $00
                0x65, 0x01, // adc $01
                0x85, 0x02, // sta $02
                0xa5, 0x01, // lda $01
                0x85, 0x00, // sta $00
                0xa5, 0x02, // lda $02
                0x85, 0x01, // sta $01
                0x90, 0xef, // bcc loop
            ]
        );
    }
}

mod parsing {
    use super::*;

    #[test]
    fn comments_and_blank_lines_are_ignored() {
        let bytes = image(
            "; leading comment\n\
             \n\
             lda #$01 ; trailing comment\n",
        );
        assert_eq!(bytes, vec![0xa9, 0x01]);
    }

    #[test]
    fn labels_may_share_a_line_with_an_instruction() {
        let bytes = image(".org $0200\nloop: bne loop");
        assert_eq!(bytes, vec![0xd0, 0xfe]);
    }

    #[test]
    fn arithmetic_respects_precedence() {
        assert_eq!(image("lda #2+3*4"), vec![0xa9, 14]);
        assert_eq!(image("lda #%00001111"), vec![0xa9, 0x0f]);
        assert_eq!(image("lda #16/4"), vec![0xa9, 4]);
    }

    #[test]
    fn unknown_mnemonics_are_parse_errors() {
        let err = assemble_str("xyzzy #$01", "test.s").unwrap_err();
        match err {
            AsmError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("expected Parse, got {:?}", other),
        }
    }

    #[test]
    fn org_requires_a_constant() {
        assert!(assemble_str(".org later\nlater:", "test.s").is_err());
    }
}
